//! Structured errors for tool input handled by the server itself.
//!
//! Agent and storage failures arrive as `waystation_core::Error` and carry
//! their own codes.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid input parameters (e.g., unknown method).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Unknown control message type.
    #[error("INVALID_MESSAGE: {0}")]
    InvalidMessage(String),

    /// Reloaded configuration failed to load or validate.
    #[error("INVALID_CONFIG: {0}")]
    InvalidConfig(String),

    /// The reply port closed before an answer arrived.
    #[error("NO_REPLY: {0}")]
    NoReply(String),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        let (code, message) = match &err {
            ServerError::InvalidInput(msg) => (-32602, msg.clone()),
            ServerError::InvalidMessage(msg) => (-32602, msg.clone()),
            ServerError::InvalidConfig(msg) => (-32602, msg.clone()),
            ServerError::NoReply(msg) => (-32000, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let err: McpError = ServerError::InvalidInput("method".into()).into();
        assert_eq!(err.code, ErrorCode(-32602));
        assert_eq!(err.message, "method");
    }
}
