//! message tool implementation.
//!
//! Posts a control message to a registration slot and waits for the reply
//! on its port.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use waystation_agent::{ControlMessage, Registration, Slot};
use waystation_core::Error;

use crate::error::ServerError;

/// Input parameters for the message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageParams {
    /// One of GET_VERSION, SKIP_WAITING, CLIENTS_CLAIM, PING.
    #[serde(rename = "type")]
    pub message_type: String,

    /// "active" (default) or "waiting".
    #[serde(default = "default_slot")]
    pub slot: String,
}

fn default_slot() -> String {
    "active".into()
}

/// Output structure for the message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageOutput {
    /// The reply as sent on the port: a version string or `{"type": ...}`.
    pub reply: serde_json::Value,
}

fn parse(params: &MessageParams) -> Result<(Slot, ControlMessage), ServerError> {
    let slot: Slot = serde_json::from_value(serde_json::Value::String(params.slot.to_ascii_lowercase()))
        .map_err(|_| ServerError::InvalidInput(format!("unknown slot {}", params.slot)))?;
    let message: ControlMessage = serde_json::from_value(serde_json::json!({ "type": params.message_type }))
        .map_err(|_| ServerError::InvalidMessage(params.message_type.clone()))?;
    Ok((slot, message))
}

/// Implementation of the message tool.
pub async fn message_impl(registration: &Arc<Registration>, params: MessageParams) -> Result<CallToolResult, McpError> {
    let (slot, message) = parse(&params)?;

    let reply = registration
        .post_message(slot, message)
        .await
        .map_err(|_| ServerError::NoReply(params.message_type.clone()))??;

    let output = MessageOutput {
        reply: serde_json::to_value(&reply).map_err(|e| Error::InvalidInput(format!("Failed to serialize reply: {e}")))?,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
