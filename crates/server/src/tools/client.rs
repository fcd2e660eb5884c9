//! client_connect and client_disconnect tool implementations.
//!
//! A client stands for one open page of the hosted application. Pass its
//! id to the fetch tool to route requests through its controlling version.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_agent::{ClientId, Registration, Slot, VersionId};
use waystation_core::Error;

/// Output structure for the client_connect tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientConnectOutput {
    pub client_id: ClientId,
    /// Version controlling the client; none before the first activation.
    pub controller: Option<VersionId>,
}

/// Input parameters for the client_disconnect tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientDisconnectParams {
    pub client_id: ClientId,
}

/// Output structure for the client_disconnect tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientDisconnectOutput {
    /// Active version after the client closed.
    pub active: Option<VersionId>,
    /// Version still waiting for clients to close.
    pub waiting: Option<VersionId>,
}

fn to_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the client_connect tool.
pub async fn connect_impl(registration: &Registration) -> Result<CallToolResult, McpError> {
    let client_id = registration.connect_client().await;
    let controller = registration.controller_of(client_id).await;
    to_result(&ClientConnectOutput { client_id, controller })
}

/// Implementation of the client_disconnect tool.
pub async fn disconnect_impl(
    registration: &Registration, params: ClientDisconnectParams,
) -> Result<CallToolResult, McpError> {
    registration.disconnect_client(params.client_id).await?;
    let output = ClientDisconnectOutput {
        active: registration.slot_id(Slot::Active).await,
        waiting: registration.slot_id(Slot::Waiting).await,
    };
    to_result(&output)
}
