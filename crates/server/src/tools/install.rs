//! install tool implementation.
//!
//! Builds a new version from freshly loaded configuration and manifest and
//! installs it next to the running one. The new version waits while the
//! active version still controls clients, unless it skips waiting.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use waystation_agent::{AgentVersion, PrecacheManifest, Registration, RetryQueue, VersionId, WorkerState};
use waystation_core::{AppConfig, Error};

use crate::error::ServerError;

/// Input parameters for the install tool. Unset fields keep the loaded
/// configuration values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InstallParams {
    /// Version string reported by GET_VERSION.
    #[serde(default)]
    pub version: Option<String>,

    /// Store name suffix; stores of other suffixes are deleted on activation.
    #[serde(default)]
    pub cache_suffix: Option<String>,

    /// Precache manifest file.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    /// Activate without waiting for clients of the active version to close.
    #[serde(default)]
    pub skip_waiting: Option<bool>,
}

/// Output structure for the install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallOutput {
    pub version_id: VersionId,
    pub version: String,
    /// "waiting" or "active".
    pub state: String,
    pub precached: usize,
}

/// Load the manifest named by `config` and build a version from it.
pub async fn build_version(config: &AppConfig, queue: Arc<RetryQueue>) -> Result<AgentVersion, Error> {
    let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
    let manifest = match &config.manifest_path {
        Some(path) => PrecacheManifest::load(path, &origin, &config.ignore_url_parameters).await?,
        None => PrecacheManifest::default(),
    };
    tracing::info!(version = %config.version, assets = manifest.len(), "precache manifest loaded");
    AgentVersion::from_config(config, manifest, queue)
}

/// Implementation of the install tool.
pub async fn install_impl(
    registration: &Registration, mut config: AppConfig, params: InstallParams,
) -> Result<CallToolResult, McpError> {
    if let Some(version) = params.version {
        config.version = version;
    }
    if let Some(suffix) = params.cache_suffix {
        config.cache_suffix = suffix;
    }
    if let Some(path) = params.manifest_path {
        config.manifest_path = Some(path);
    }
    if let Some(skip_waiting) = params.skip_waiting {
        config.skip_waiting = skip_waiting;
    }
    config.validate().map_err(|e| ServerError::InvalidConfig(e.to_string()))?;

    let version = build_version(&config, Arc::clone(registration.queue())).await?;
    let precached = version.precacher().manifest.len();
    let version_id = registration.install(version).await?;

    let state = match registration.state_of(version_id).await {
        Some(WorkerState::Active) => "active",
        Some(WorkerState::Waiting) => "waiting",
        other => {
            return Err(Error::InvalidState(format!("version {version_id} ended install as {other:?}")).into());
        }
    };
    let output = InstallOutput { version_id, version: config.version, state: state.into(), precached };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
