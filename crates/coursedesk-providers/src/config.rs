//! Backend configuration and provider factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use coursedesk_core::question::GradingPolicy;
use coursedesk_core::reporting::RiskPolicy;
use coursedesk_core::traits::DataProvider;

use crate::memory::MemoryProvider;
use crate::rpc::{RpcProvider, DEFAULT_TIMEOUT_SECS};

/// Which backend to talk to.
///
/// Note: Custom Debug impl masks the seed password.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Rpc {
        endpoint: String,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
    Memory {
        /// JSON file the store is loaded from and saved to. In-process only
        /// when absent.
        #[serde(default)]
        data_file: Option<PathBuf>,
        /// Start from the demo data when there is no data file yet.
        #[serde(default)]
        seed: bool,
        /// Password given to every demo account.
        #[serde(default)]
        seed_password: Option<String>,
    },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Rpc {
                endpoint,
                timeout_secs,
            } => f
                .debug_struct("Rpc")
                .field("endpoint", endpoint)
                .field("timeout_secs", timeout_secs)
                .finish(),
            BackendConfig::Memory {
                data_file,
                seed,
                seed_password,
            } => f
                .debug_struct("Memory")
                .field("data_file", data_file)
                .field("seed", seed)
                .field("seed_password", &seed_password.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory {
            data_file: None,
            seed: true,
            seed_password: None,
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Login used by commands that act on behalf of a user.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub risk: RiskPolicy,
    #[serde(default)]
    pub grading: GradingPolicy,
}

/// Top-level coursedesk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoursedeskConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = resolve_env_vars(v);
    }
}

impl CoursedeskConfig {
    /// Expand `${VAR}` references in every string setting.
    fn resolve(&mut self) {
        match &mut self.backend {
            BackendConfig::Rpc { endpoint, .. } => *endpoint = resolve_env_vars(endpoint),
            BackendConfig::Memory {
                data_file,
                seed_password,
                ..
            } => {
                if let Some(path) = data_file {
                    *path = PathBuf::from(resolve_env_vars(&path.to_string_lossy()));
                }
                resolve_opt(seed_password);
            }
        }
        resolve_opt(&mut self.auth.username);
        resolve_opt(&mut self.auth.password);
    }

    /// Apply `COURSEDESK_*` environment overrides.
    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("COURSEDESK_ENDPOINT") {
            let timeout_secs = match &self.backend {
                BackendConfig::Rpc { timeout_secs, .. } => *timeout_secs,
                BackendConfig::Memory { .. } => DEFAULT_TIMEOUT_SECS,
            };
            self.backend = BackendConfig::Rpc {
                endpoint,
                timeout_secs,
            };
        }
        if let Ok(username) = std::env::var("COURSEDESK_USERNAME") {
            self.auth.username = Some(username);
        }
        if let Ok(password) = std::env::var("COURSEDESK_PASSWORD") {
            self.auth.password = Some(password);
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `coursedesk.toml` in the current directory
/// 2. `~/.config/coursedesk/config.toml`
///
/// Environment variable overrides: `COURSEDESK_ENDPOINT`,
/// `COURSEDESK_USERNAME`, `COURSEDESK_PASSWORD`.
pub fn load_config() -> Result<CoursedeskConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CoursedeskConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("coursedesk.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => parse_config(path)?,
        None => CoursedeskConfig::default(),
    };

    config.apply_env();
    config.resolve();
    tracing::debug!(path = ?config_path, backend = ?config.backend, "loaded config");

    Ok(config)
}

fn parse_config(path: &Path) -> Result<CoursedeskConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<CoursedeskConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("coursedesk"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &BackendConfig) -> Result<Arc<dyn DataProvider>> {
    match config {
        BackendConfig::Rpc {
            endpoint,
            timeout_secs,
        } => {
            if endpoint.trim().is_empty() {
                anyhow::bail!("backend endpoint is empty");
            }
            let provider = RpcProvider::new(endpoint, *timeout_secs)
                .context("failed to create RPC provider")?;
            Ok(Arc::new(provider))
        }
        BackendConfig::Memory {
            data_file: Some(path),
            seed,
            seed_password,
        } => {
            let provider = MemoryProvider::open(path, *seed, seed_password.as_deref())
                .with_context(|| format!("failed to open data file: {}", path.display()))?;
            Ok(Arc::new(provider))
        }
        BackendConfig::Memory {
            data_file: None,
            seed,
            seed_password,
        } => {
            let provider = if *seed {
                MemoryProvider::seeded(seed_password.as_deref())
            } else {
                MemoryProvider::new()
            };
            Ok(Arc::new(provider))
        }
    }
}
