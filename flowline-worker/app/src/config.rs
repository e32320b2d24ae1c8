//! Application configuration.
//!
//! Loaded once at startup from an optional YAML or JSON file with environment
//! overrides layered on top, e.g. `FLOWLINE__RUNTIME__CHANNEL_CAPACITY=64`.

use flowline_core::codec::DecodePolicy;
use flowline_core::resolve::DEFAULT_PROFILE;
use flowline_core::runtime::Runtime;
use flowline_stream::config::{StreamOptions, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "FLOWLINE_CONFIG";
/// Configuration file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "flowline.yaml";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "FLOWLINE";
/// Separator of nested keys in environment overrides.
pub const ENV_SEPARATOR: &str = "__";
/// Default delay between drain completion and process exit.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Errors that can occur while loading configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configuration file could not be read.
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration could not be parsed or deserialized.
    #[error("Failed to parse configuration: {source}")]
    Config {
        #[source]
        source: config::ConfigError,
    },
    /// An override rule has an invalid pattern.
    #[error(transparent)]
    Override(#[from] flowline_core::resolve::Error),
}

/// Main application configuration.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Override rules, registered in file order.
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
}

/// Stream and process lifetime settings.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Bound of every record channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Outbound TCP connect timeout (default: "5s").
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Delay between drain completion and exit (default: "100ms").
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Handling of undecodable input lines.
    #[serde(default)]
    pub decode: DecodePolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            decode: DecodePolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            channel_capacity: self.channel_capacity,
            connect_timeout: self.connect_timeout,
            decode: self.decode,
        }
    }
}

/// One override rule.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct OverrideConfig {
    /// Glob over dotted flow paths.
    pub flow: String,
    /// Glob over profile names (default: `$default`).
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Patch of the form `{"params": {...}, "cli": {...}}`.
    pub config: Value,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

impl AppConfig {
    /// Loads configuration from [`CONFIG_PATH_ENV`], falling back to
    /// [`DEFAULT_CONFIG_PATH`] when present, then applies environment
    /// overrides.
    ///
    /// A file named by the environment variable must exist.
    pub fn load() -> Result<Self, Error> {
        let (path, required) = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        let contents = if required || path.exists() {
            Some(read(&path)?)
        } else {
            debug!("No configuration file, using defaults");
            None
        };
        Self::build(contents.as_deref().map(|c| (c, format_of(&path))))
    }

    /// Loads configuration from a file, without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let contents = read(path)?;
        let config = config::Config::builder()
            .add_source(config::File::from_str(&contents, format_of(path)))
            .build()
            .map_err(|e| Error::Config { source: e })?;
        config
            .try_deserialize::<AppConfig>()
            .map_err(|e| Error::Config { source: e })
    }

    fn build(file: Option<(&str, config::FileFormat)>) -> Result<Self, Error> {
        let mut builder = config::Config::builder();
        if let Some((contents, format)) = file {
            builder = builder.add_source(config::File::from_str(contents, format));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config { source: e })?;
        config
            .try_deserialize::<AppConfig>()
            .map_err(|e| Error::Config { source: e })
    }

    /// Registers the configured override rules, in order.
    pub fn register_overrides(&self, runtime: &mut Runtime) -> Result<(), Error> {
        for rule in &self.overrides {
            runtime.register_override(&rule.flow, &rule.profile, rule.config.clone())?;
        }
        if !self.overrides.is_empty() {
            info!(rules = self.overrides.len(), "Registered override rules");
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::IO {
        path: path.to_path_buf(),
        source: e,
    })
}

/// File format from the extension, JSON when unknown.
fn format_of(path: &Path) -> config::FileFormat {
    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => config::FileFormat::Yaml,
        _ => config::FileFormat::Json,
    }
}
