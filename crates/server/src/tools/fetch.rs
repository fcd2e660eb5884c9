//! fetch tool implementation.
//!
//! Runs a request through the active version, as a page of the hosted
//! application would. Declined requests go straight to the network.

use std::collections::BTreeMap;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_agent::fetch::resolve;
use waystation_agent::{ClientId, FetchOutcome, Registration, Request, RequestMode, Response};
use waystation_core::Error;

use crate::error::ServerError;

/// Input parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path relative to the application origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body, sent as UTF-8.
    #[serde(default)]
    pub body: Option<String>,

    /// Issue the request as a top-level navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Client issuing the request (see client_connect). Without one the
    /// active version handles the request.
    #[serde(default)]
    pub client_id: Option<ClientId>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchOutput {
    /// HTTP status; 0 when nothing could answer.
    pub status: u16,
    /// "network", "cache", "fallback" or "error".
    pub source: String,
    /// No route handled the request.
    pub declined: bool,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
}

impl FetchOutput {
    fn from_response(response: Response, declined: bool) -> Self {
        let source = serde_json::to_value(response.source)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            status: response.status,
            source,
            declined,
            headers: response.headers,
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }
    }
}

fn build_request(origin: &Url, params: FetchParams) -> Result<Request, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }
    let url = resolve(origin, &params.url).map_err(Error::from)?;
    let method = params
        .method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| ServerError::InvalidInput(format!("unknown method {}", params.method)))?;

    let mut request = Request::new(method, url);
    for (name, value) in &params.headers {
        request = request.with_header(name, value);
    }
    if let Some(body) = params.body {
        request.body = body.into();
    }
    if params.navigate {
        request.mode = RequestMode::Navigate;
    }
    Ok(request)
}

/// Implementation of the fetch tool.
pub async fn fetch_impl(registration: &Registration, origin: &Url, params: FetchParams) -> Result<CallToolResult, McpError> {
    let client = params.client_id;
    let request = build_request(origin, params)?;

    let output = match registration.fetch(client, &request).await {
        FetchOutcome::Respond(response) => FetchOutput::from_response(response, false),
        FetchOutcome::Decline => {
            let response = match registration.context().network.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "pass-through request failed");
                    Response::error()
                }
            };
            FetchOutput::from_response(response, true)
        }
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
