// config.rs

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use log::{debug, LevelFilter};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),
}

/// Runtime settings, layered from defaults, an optional `alsamidi.toml` and
/// `ALSAMIDI_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Sequencer to open, as understood by the router ("default" for ALSA).
    pub sequencer: String,
    /// Client name announced to the router.
    pub client_name: String,
    /// Name of the local port each connected device creates.
    pub port_name: String,
    pub log_level: String,
    /// Sleep between receive polls in the monitor.
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sequencer: DEFAULT_SEQUENCER.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            port_name: crate::device::DEFAULT_PORT_NAME.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Settings {
    /// Loads settings. Without `path`, `alsamidi.toml` in the working
    /// directory is used when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let builder = defaults()?;
        let builder = match path {
            Some(path) => {
                debug!("Loading settings from {}", path.display());
                builder.add_source(File::from(path))
            }
            None => builder.add_source(File::with_name(CONFIG_FILE_NAME).required(false)),
        };
        finish(builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true)))
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let fallback = Settings::default();
    Ok(Config::builder()
        .set_default("sequencer", fallback.sequencer)?
        .set_default("client_name", fallback.client_name)?
        .set_default("port_name", fallback.port_name)?
        .set_default("log_level", fallback.log_level)?
        .set_default("poll_interval_ms", fallback.poll_interval_ms)?)
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.log_level_filter()?;
    debug!("Settings: {:?}", settings);
    Ok(settings)
}


pub const BUFFER_SIZE: usize = 1024;
pub const DEFAULT_SEQUENCER: &str = "default";
pub const DEFAULT_CLIENT_NAME: &str = "alsamidi";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5;
const CONFIG_FILE_NAME: &str = "alsamidi";
const ENV_PREFIX: &str = "ALSAMIDI";
