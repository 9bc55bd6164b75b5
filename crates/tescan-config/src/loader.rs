//! Layered configuration loading.
//!
//! # Design
//! - Each source (environment, file, command line) produces a sparse `ConfigLayer`.
//! - Layers apply over the defaults in a fixed order: env, file, cli.
//! - The process environment is captured once and injected, so tests never mutate it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tescan_telemetry::LogFormat;
use tracing::{debug, warn};

use crate::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use crate::error::{ConfigError, ConfigResult};
use crate::model::ScannerConfig;
use crate::validate::{normalize_path, validate};

/// Partial configuration contributed by one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    /// Override for [`ScannerConfig::input_directory`].
    pub input_directory: Option<PathBuf>,
    /// Override for [`ScannerConfig::reports_directory`].
    pub reports_directory: Option<PathBuf>,
    /// Override for [`ScannerConfig::benign_directory`].
    pub benign_directory: Option<PathBuf>,
    /// Override for [`ScannerConfig::quarantine_directory`].
    pub quarantine_directory: Option<PathBuf>,
    /// Override for [`ScannerConfig::error_directory`].
    pub error_directory: Option<PathBuf>,
    /// Override for [`ScannerConfig::appliance_ip`].
    pub appliance_ip: Option<String>,
    /// Override for [`ScannerConfig::concurrency`].
    pub concurrency: Option<usize>,
    /// Override for [`ScannerConfig::seconds_to_wait`].
    pub seconds_to_wait: Option<u64>,
    /// Override for [`ScannerConfig::max_retries`].
    pub max_retries: Option<u32>,
    /// Override for [`ScannerConfig::request_timeout_secs`].
    pub request_timeout_secs: Option<u64>,
    /// Override for [`ScannerConfig::log_level`].
    pub log_level: Option<String>,
    /// Override for [`ScannerConfig::log_format`].
    pub log_format: Option<LogFormat>,
}

/// Scalar as read from a source before typing.
enum RawValue<'a> {
    Text(&'a str),
    Integer(i64),
}

impl RawValue<'_> {
    fn display(&self) -> String {
        match self {
            Self::Text(text) => (*text).to_string(),
            Self::Integer(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "DEFAULT", default)]
    legacy_default: Option<toml::Table>,
    #[serde(flatten)]
    top_level: toml::Table,
}

impl ConfigLayer {
    /// Collect `TE_*` variables. Unrelated and unknown variables are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a recognised variable has a
    /// value of the wrong type.
    pub fn from_env<I>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Self::default();
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            if !layer.set("env", &key, &RawValue::Text(&value))? {
                debug!(variable = %name, "ignoring unrecognised environment override");
            }
        }
        Ok(layer)
    }

    /// Parse a TOML document. Keys may sit at the top level or inside a
    /// `[DEFAULT]` table; top-level keys win when both are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::InvalidField`] for values of the wrong type.
    pub fn from_toml_str(text: &str, origin: &Path) -> ConfigResult<Self> {
        let document: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let mut layer = Self::default();
        for table in document.legacy_default.iter().chain([&document.top_level]) {
            for (key, value) in table {
                let raw = match value {
                    toml::Value::String(text) => RawValue::Text(text),
                    toml::Value::Integer(number) => RawValue::Integer(*number),
                    toml::Value::Table(_) => {
                        warn!(key = %key, file = %origin.display(), "ignoring unknown config table");
                        continue;
                    }
                    other => {
                        return Err(ConfigError::InvalidField {
                            section: "file",
                            field: key.clone(),
                            value: Some(other.to_string()),
                            reason: "unsupported_type",
                        });
                    }
                };
                if !layer.set("file", key, &raw)? {
                    warn!(key = %key, file = %origin.display(), "ignoring unknown config key");
                }
            }
        }
        Ok(layer)
    }

    /// Read a TOML file. A missing file yields an empty layer unless `required`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileMissing`] for a missing required file,
    /// [`ConfigError::Io`] when it cannot be read, and parse errors otherwise.
    pub fn from_file(path: &Path, required: bool) -> ConfigResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text, path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if required {
                    Err(ConfigError::FileMissing {
                        path: path.to_path_buf(),
                    })
                } else {
                    debug!(file = %path.display(), "no config file; using defaults and overrides");
                    Ok(Self::default())
                }
            }
            Err(source) => Err(ConfigError::Io {
                operation: "config.read",
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Overwrite the fields of `config` that this layer sets.
    pub fn apply_to(self, config: &mut ScannerConfig) {
        fn take<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        take(&mut config.input_directory, self.input_directory);
        take(&mut config.reports_directory, self.reports_directory);
        take(&mut config.benign_directory, self.benign_directory);
        take(&mut config.quarantine_directory, self.quarantine_directory);
        take(&mut config.error_directory, self.error_directory);
        take(&mut config.appliance_ip, self.appliance_ip);
        take(&mut config.concurrency, self.concurrency);
        take(&mut config.seconds_to_wait, self.seconds_to_wait);
        take(&mut config.max_retries, self.max_retries);
        take(&mut config.request_timeout_secs, self.request_timeout_secs);
        take(&mut config.log_level, self.log_level);
        take(&mut config.log_format, self.log_format);
    }

    /// Returns `false` when `key` names no setting.
    fn set(&mut self, section: &'static str, key: &str, raw: &RawValue<'_>) -> ConfigResult<bool> {
        match key {
            "input_directory" => self.input_directory = Some(text(section, key, raw)?.into()),
            "reports_directory" => self.reports_directory = Some(text(section, key, raw)?.into()),
            "benign_directory" => self.benign_directory = Some(text(section, key, raw)?.into()),
            "quarantine_directory" => {
                self.quarantine_directory = Some(text(section, key, raw)?.into());
            }
            "error_directory" => self.error_directory = Some(text(section, key, raw)?.into()),
            "appliance_ip" => self.appliance_ip = Some(text(section, key, raw)?),
            "concurrency" => self.concurrency = Some(integer(section, key, raw)?),
            "seconds_to_wait" => self.seconds_to_wait = Some(integer(section, key, raw)?),
            "max_retries" => self.max_retries = Some(integer(section, key, raw)?),
            "request_timeout_secs" => {
                self.request_timeout_secs = Some(integer(section, key, raw)?);
            }
            "log_level" => self.log_level = Some(text(section, key, raw)?),
            "log_format" => {
                let label = text(section, key, raw)?;
                let format = label.parse().map_err(|_| ConfigError::InvalidField {
                    section,
                    field: key.to_string(),
                    value: Some(label.clone()),
                    reason: "unknown_log_format",
                })?;
                self.log_format = Some(format);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn text(section: &'static str, key: &str, raw: &RawValue<'_>) -> ConfigResult<String> {
    match raw {
        RawValue::Text(text) => Ok((*text).to_string()),
        RawValue::Integer(_) => Err(ConfigError::InvalidField {
            section,
            field: key.to_string(),
            value: Some(raw.display()),
            reason: "expected_string",
        }),
    }
}

fn integer<T: FromStr>(section: &'static str, key: &str, raw: &RawValue<'_>) -> ConfigResult<T> {
    raw.display()
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidField {
            section,
            field: key.to_string(),
            value: Some(raw.display()),
            reason: "expected_integer",
        })
}

/// Builds a validated [`ScannerConfig`] from every source.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env: HashMap<String, String>,
    config_file: Option<PathBuf>,
    overrides: ConfigLayer,
}

impl ConfigLoader {
    /// Loader with an empty environment and no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader seeded with a snapshot of the process environment.
    #[must_use]
    pub fn from_process_env() -> Self {
        let env = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self::new().with_env(env)
    }

    /// Replace the environment snapshot used for `TE_*` overrides and path expansion.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Use an explicit config file; it must then exist.
    #[must_use]
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Highest-precedence overrides, usually from the command line.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigLayer) -> Self {
        self.overrides = overrides;
        self
    }

    /// Merge every layer, normalise paths and validate.
    ///
    /// # Errors
    ///
    /// Returns the first source error encountered, or a
    /// [`ConfigError::Validation`] listing every invalid field.
    pub fn load(&self) -> ConfigResult<ScannerConfig> {
        let mut config = ScannerConfig::default();

        let env_layer = ConfigLayer::from_env(
            self.env
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        )?;
        let file_layer = match &self.config_file {
            Some(path) => ConfigLayer::from_file(path, true)?,
            None => ConfigLayer::from_file(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };

        env_layer.apply_to(&mut config);
        file_layer.apply_to(&mut config);
        self.overrides.clone().apply_to(&mut config);

        let lookup = |name: &str| self.env.get(name).cloned();
        for path in [
            &mut config.input_directory,
            &mut config.reports_directory,
            &mut config.benign_directory,
            &mut config.quarantine_directory,
            &mut config.error_directory,
        ] {
            if !path.as_os_str().is_empty() {
                *path = normalize_path(path.as_path(), lookup);
            }
        }
        config.appliance_ip = config.appliance_ip.trim().to_string();

        validate(&config)?;
        Ok(config)
    }
}
