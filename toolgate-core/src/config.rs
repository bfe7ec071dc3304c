//! Configuration for the gateway

use crate::error::{GatewayError, Result};
use crate::gateway::{CollisionPolicy, RedactionPolicy};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an extra configuration file
pub const CONFIG_PATH_ENV: &str = "TOOLGATE_CONFIG_PATH";

/// Main gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Tool names callers may invoke; empty blocks everything
    pub allowlist: Vec<String>,

    pub policies: PolicyConfig,

    pub observability: ObservabilityConfig,

    pub resolver: ResolverConfig,

    /// Remote MCP tool servers, registered after in-process providers
    pub remote: Vec<RemoteServerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Block tools that can mutate state
    pub read_only: bool,

    pub budgets: BudgetConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Calls allowed per budget key; 0 means unlimited
    pub max_tool_calls: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub redact: RedactionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub collision: CollisionPolicy,
}

/// One remote tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    /// Provider id used in logs
    pub name: String,

    /// JSON-RPC endpoint
    pub url: String,

    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl RemoteServerConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Later sources override earlier ones:
    /// 1. Defaults
    /// 2. `toolgate.toml`, then `toolgate.yaml` in the working directory
    /// 3. The file named by `TOOLGATE_CONFIG_PATH`
    /// 4. `TOOLGATE_`-prefixed variables, nested with `__`
    ///    (`TOOLGATE_POLICIES__READ_ONLY=true`)
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()))
            .merge(Toml::file("toolgate.toml"))
            .merge(Yaml::file("toolgate.yaml"));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = merge_file(figment, Path::new(&path))?;
        }

        let config: GatewayConfig = figment
            .merge(Env::prefixed("TOOLGATE_").split("__").ignore(&["config_path"]))
            .extract()
            .map_err(|e| GatewayError::Configuration(format!("Failed to load configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load a single TOML, YAML or JSON file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(GatewayConfig::default()));
        let config: GatewayConfig = merge_file(figment, path.as_ref())?
            .extract()
            .map_err(|e| {
                GatewayError::Configuration(format!("Failed to load configuration file: {e}"))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in &self.allowlist {
            if name.trim().is_empty() {
                return Err(GatewayError::Configuration(
                    "allowlist contains an empty tool name".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(GatewayError::Configuration(format!(
                    "allowlist lists '{name}' more than once"
                )));
            }
        }

        let mut remotes = HashSet::new();
        for remote in &self.remote {
            if remote.name.trim().is_empty() {
                return Err(GatewayError::Configuration(
                    "remote server has an empty name".to_string(),
                ));
            }
            if remote.url.trim().is_empty() {
                return Err(GatewayError::Configuration(format!(
                    "remote server '{}' has an empty url",
                    remote.name
                )));
            }
            if !remotes.insert(remote.name.as_str()) {
                return Err(GatewayError::Configuration(format!(
                    "remote server '{}' is configured more than once",
                    remote.name
                )));
            }
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    if !path.is_file() {
        return Err(GatewayError::Configuration(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
        Some("json") => Ok(figment.merge(Json::file(path))),
        _ => Err(GatewayError::Configuration(format!(
            "unsupported configuration format: {}",
            path.display()
        ))),
    }
}
