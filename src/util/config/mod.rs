//! Binding configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Builder calls
//! 2. Environment variables (TASKBIND_*)
//! 3. Configuration file (taskbind.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use taskbind::util::config::{BindingConfig, InlinePolicy};
//!
//! let config = BindingConfig::load(None)
//!     .unwrap()
//!     .with_object_conversion(InlinePolicy::SerializedSize);
//! ```

use crate::util::logger::LogLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE: &str = "taskbind.toml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "TASKBIND_";

/// How the size of an inlining candidate is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlinePolicy {
    /// Estimate the in-memory size of containers before serializing
    #[default]
    ObjectSize,
    /// Serialize first, then measure the encoded form
    SerializedSize,
}

impl std::str::FromStr for InlinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object_size" | "objectSize" => Ok(InlinePolicy::ObjectSize),
            "serialized_size" | "serializedSize" => Ok(InlinePolicy::SerializedSize),
            other => Err(format!("unknown inline policy `{}`", other)),
        }
    }
}

/// Binding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Staging directory for spilled objects; a fresh temporary directory
    /// is created at start when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Pass small IN objects inline instead of through files
    #[serde(default)]
    pub object_conversion: bool,
    #[serde(default)]
    pub inline_policy: InlinePolicy,
    /// Per-call budget of inlined bytes
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: usize,
    /// Send variadic arguments as one list parameter
    #[serde(default)]
    pub args_as_tuple: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Persistence layer configuration; persistence is disabled when unset
    #[serde(default)]
    pub storage_conf: Option<PathBuf>,
    #[serde(default)]
    pub app_id: u64,
}

fn default_max_inline_bytes() -> usize {
    320_000
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            object_conversion: false,
            inline_policy: InlinePolicy::ObjectSize,
            max_inline_bytes: 320_000,
            args_as_tuple: false,
            log_level: LogLevel::Info,
            storage_conf: None,
            app_id: 0,
        }
    }
}

impl BindingConfig {
    /// Load the file at `path` (or `taskbind.toml` when present), then
    /// apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::ParseError)
    }

    /// Apply `TASKBIND_*` overrides read through `lookup`
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(value));
        }
        if let Some((key, value)) = var("OBJECT_CONVERSION") {
            self.object_conversion = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = var("INLINE_POLICY") {
            self.inline_policy = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })?;
        }
        if let Some((key, value)) = var("MAX_INLINE_BYTES") {
            self.max_inline_bytes = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })?;
        }
        if let Some((key, value)) = var("ARGS_AS_TUPLE") {
            self.args_as_tuple = parse_bool(&key, &value)?;
        }
        if let Some((key, value)) = var("LOG_LEVEL") {
            self.log_level = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })?;
        }
        if let Some((_, value)) = var("STORAGE_CONF") {
            self.storage_conf = if value == "null" {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        if let Some((key, value)) = var("APP_ID") {
            self.app_id = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key, value })?;
        }
        Ok(())
    }

    pub fn with_temp_dir(
        mut self,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Enable small-object inlining with the given policy
    pub fn with_object_conversion(
        mut self,
        policy: InlinePolicy,
    ) -> Self {
        self.object_conversion = true;
        self.inline_policy = policy;
        self
    }

    pub fn with_max_inline_bytes(
        mut self,
        bytes: usize,
    ) -> Self {
        self.max_inline_bytes = bytes;
        self
    }

    pub fn with_args_as_tuple(
        mut self,
        enabled: bool,
    ) -> Self {
        self.args_as_tuple = enabled;
        self
    }

    pub fn with_log_level(
        mut self,
        level: LogLevel,
    ) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_storage_conf(
        mut self,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.storage_conf = Some(path.into());
        self
    }

    pub fn with_app_id(
        mut self,
        app_id: u64,
    ) -> Self {
        self.app_id = app_id;
        self
    }
}

fn parse_bool(
    key: &str,
    value: &str,
) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    InvalidEnv { key: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::InvalidEnv { key, value } => {
                write!(f, "Invalid value `{}` for {}", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
