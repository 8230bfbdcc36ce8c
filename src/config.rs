//! Layered configuration.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file (`registro.toml`, or the path given on the command line)
//! 3. Environment variables (`REGISTRO_*`, `__` separates sections)
//!
//! Example: `REGISTRO_SERVER__BIND=0.0.0.0:8000` overrides `server.bind`.

use crate::error::AppError;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for config overrides.
const ENV_PREFIX: &str = "REGISTRO_";

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "registro.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Origins allowed by CORS. Empty rejects every cross-origin request.
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("registro.db"),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    /// Accept revisiones on `aprobada`/`rechazada` solicitudes.
    pub allow_review_of_finalized: bool,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            allow_review_of_finalized: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub render_timeout_secs: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            render_timeout_secs: 30,
        }
    }
}

impl ExportSettings {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives. `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "registro_solicitudes=info,tower_http=info".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub lifecycle: LifecycleSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from `path` (or [`DEFAULT_CONFIG_FILE`]) and the
    /// environment. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::extract(figment(path, ENV_PREFIX))
    }

    fn extract(figment: Figment) -> Result<Self, AppError> {
        figment
            .extract()
            .map_err(|e| AppError::internal(format!("config extraction failed: {e}")))
    }
}

fn figment(path: &Path, env_prefix: &str) -> Figment {
    Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(env_prefix).split("__"))
}
