//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::error::ServerError;
use crate::tools::{
    CacheGetParams, CachePurgeParams, ClientDisconnectParams, FetchParams, InstallParams, MessageParams, SyncParams,
    cache, client, fetch::fetch_impl, install::install_impl, message::message_impl, sync::sync_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use url::Url;
use waystation_agent::Registration;
use waystation_core::AppConfig;

/// The main MCP server handler for waystation.
#[derive(Clone)]
pub struct WaystationServer {
    registration: Arc<Registration>,
    origin: Url,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl WaystationServer {
    /// Create a new server handler around a booted registration.
    pub fn new(registration: Arc<Registration>, origin: Url) -> Self {
        Self { registration, origin, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Fetch a URL through the caching agent. Returns status, headers, body and whether the response came from the network, a cache, or the offline fallback."
    )]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.registration, &self.origin, params.0).await
    }

    #[tool(
        description = "Send a control message (GET_VERSION, SKIP_WAITING, CLIENTS_CLAIM, PING) to the active or waiting version and return its reply."
    )]
    async fn message(&self, params: Parameters<MessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.registration, params.0).await
    }

    #[tool(
        description = "Reload configuration and the precache manifest and install them as a new version. It waits while the active version controls open clients unless skip_waiting is set."
    )]
    async fn install(&self, params: Parameters<InstallParams>) -> Result<CallToolResult, McpError> {
        let config = AppConfig::load().map_err(|e| ServerError::InvalidConfig(e.to_string()))?;
        install_impl(&self.registration, config, params.0).await
    }

    #[tool(description = "Open a client (an application page). It is controlled by the active version.")]
    async fn client_connect(&self) -> Result<CallToolResult, McpError> {
        client::connect_impl(&self.registration).await
    }

    #[tool(
        description = "Close a client. A waiting version activates once the active version controls no clients."
    )]
    async fn client_disconnect(&self, params: Parameters<ClientDisconnectParams>) -> Result<CallToolResult, McpError> {
        client::disconnect_impl(&self.registration, params.0).await
    }

    #[tool(description = "Connectivity restored: replay queued requests in order, optionally sweeping expired cache entries.")]
    async fn sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.registration, params.0).await
    }

    #[tool(description = "Look up the cached response for a URL, or list the entries of a store.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        cache::get_impl(&self.registration.context().db, &self.origin, params.0).await
    }

    #[tool(description = "Purge cache entries by URL, age or count, or delete a whole store.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        cache::purge_impl(&self.registration.context().db, params.0).await
    }
}

impl ServerHandler for WaystationServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "waystation".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
