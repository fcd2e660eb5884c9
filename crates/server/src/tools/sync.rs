//! sync tool implementation.
//!
//! Signals that connectivity is back: replays the retry queue and,
//! optionally, runs an expiration sweep.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use waystation_agent::Registration;
use waystation_core::Error;

/// Parameters for the sync tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Also enforce every expiration policy of the active version.
    #[serde(default)]
    pub sweep: bool,
}

/// Output from the sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncOutput {
    /// Requests delivered and removed from the queue.
    pub replayed: usize,
    /// Requests dropped for exceeding the retention window.
    pub expired: usize,
    /// Requests still waiting.
    pub remaining: u64,
    /// Replay stopped at a request that still cannot be delivered.
    pub stalled: bool,
    /// Entries evicted by the sweep.
    pub evicted: u64,
}

/// Implementation of the sync tool.
pub async fn sync_impl(registration: &Registration, params: SyncParams) -> Result<CallToolResult, McpError> {
    let report = registration.sync().await?;
    let evicted = if params.sweep { registration.sweep().await? } else { 0 };

    let output = SyncOutput {
        replayed: report.replayed,
        expired: report.expired,
        remaining: report.remaining,
        stalled: report.stalled,
        evicted,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{registration, text};
    use waystation_agent::Request;

    #[tokio::test]
    async fn test_sync_replays_queue() {
        let (reg, origin) = registration().await;
        reg.queue()
            .push_request(&Request::post(origin.join("/api/v1/auth/login").unwrap(), "{}"))
            .await
            .unwrap();

        let result = sync_impl(&reg, SyncParams { sweep: true }).await.unwrap();
        let output: SyncOutput = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(output.replayed, 1);
        assert_eq!(output.remaining, 0);
        assert!(!output.stalled);
    }

    #[tokio::test]
    async fn test_sync_empty_queue() {
        let (reg, _origin) = registration().await;
        let result = sync_impl(&reg, SyncParams::default()).await.unwrap();
        let output: SyncOutput = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(output.replayed, 0);
        assert_eq!(output.evicted, 0);
    }
}
