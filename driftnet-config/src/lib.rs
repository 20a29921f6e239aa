//! # driftnet configuration
//!
//! Layered configuration for the collector:
//! 1. built-in defaults
//! 2. `config/driftnet.yaml`
//! 3. `config/<DRIFTNET_ENV>.yaml` (`production` when unset)
//! 4. `DRIFTNET_*` environment variables, nested with `__`
//!    (`DRIFTNET_LISTENER__PORT=2055`)
//!
//! Every loaded configuration is validated before it is returned.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

mod dispatcher;
mod error;
mod listener;
mod telemetry;
mod validation;

pub use dispatcher::DispatcherConfig;
pub use error::ConfigError;
pub use listener::{ListenerConfig, ListenerTunables};
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/driftnet.yaml";
const ENV_PREFIX: &str = "DRIFTNET_";

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct DriftnetConfig {
    #[serde(default)]
    #[validate(nested)]
    pub listener: ListenerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl DriftnetConfig {
    /// Loads the layered configuration from the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(DriftnetConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        } else {
            debug!("{BASE_FILE} not found, using default configuration");
        }

        let env = std::env::var("DRIFTNET_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Loads one explicit file over the defaults, then the environment.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(DriftnetConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}
