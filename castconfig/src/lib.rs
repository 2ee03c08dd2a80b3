//! # Castify Configuration Module
//!
//! This module provides configuration management for Castify, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters for configuration values
//! - Thread-safe singleton access pattern
//!
//! Loading never writes anything to disk: Castify keeps no state across
//! restarts. [`Config::save`] is available for callers that explicitly want it.
//!
//! ## Usage
//!
//! ```no_run
//! use castconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let ttl = config.get_transcode_cache_ttl()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use castutils::lan_ipv4;
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("castify.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(Config::load_or_default(""));
}

const ENV_CONFIG_DIR: &str = "CASTIFY_CONFIG";
const ENV_PREFIX: &str = "CASTIFY_CONFIG__";
const CONFIG_DIR_NAME: &str = ".castify";

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_LOG_BUFFER_CAPACITY: usize = 1000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DETAIL_TIMEOUT_SECS: u64 = 3;
const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 5;
const DEFAULT_SEARCH_TARGETS: &[&str] = &[
    "ssdp:all",
    "urn:schemas-upnp-org:device:MediaRenderer:1",
    "urn:schemas-upnp-org:device:MediaRenderer:2",
];

const DEFAULT_RENDERER_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
const DEFAULT_HEARTBEAT_SECS: u64 = 30;

const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
const DEFAULT_FFPROBE_PATH: &str = "ffprobe";
const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_SUBTITLE_LANGUAGES: &[&str] = &["zh", "zh-CN", "chi", "en", "eng"];
const DEFAULT_AUDIO_TRANSCODE_CODECS: &[&str] = &["dts", "ac3"];

/// Macro to generate a getter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                Ok(_) | Err(_) => Ok($default),
            }
        }
    };
}

/// Macro to generate a getter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                Ok(_) | Err(_) => Ok($default),
            }
        }
    };
}

/// Macro to generate a getter for durations stored as an integer count of `$unit`
macro_rules! impl_duration_config {
    ($getter:ident, $path:expr, $default:expr, $unit:path) => {
        pub fn $getter(&self) -> Result<Duration> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => match n.as_u64() {
                    Some(v) => Ok($unit(v)),
                    None => Err(anyhow!("{} must be a positive integer", $path.join("."))),
                },
                Ok(Value::String(s)) => s
                    .trim()
                    .parse::<u64>()
                    .map($unit)
                    .map_err(|_| anyhow!("{} is not a number: '{}'", $path.join("."), s)),
                Ok(_) | Err(_) => Ok($unit($default)),
            }
        }
    };
}

/// Macro to generate a getter for string lists with default
macro_rules! impl_string_list_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Vec<String> {
            match self.get_value($path) {
                Ok(Value::Sequence(seq)) => seq
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect(),
                Ok(Value::String(s)) => s
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
                Ok(_) | Err(_) => $default.iter().map(|s| s.to_string()).collect(),
            }
        }
    };
}

/// Macro to generate a getter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => s,
                Ok(_) | Err(_) => $default.to_string(),
            }
        }
    };
}

/// Configuration manager for Castify
///
/// Holds the merged YAML tree (embedded defaults, then `config.yaml`, then
/// `CASTIFY_CONFIG__*` environment overrides) behind a mutex.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().expect("config mutex poisoned").clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    ///
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `CASTIFY_CONFIG` environment variable
    /// 3. `.castify` in the current directory
    /// 4. `.castify` in the user's home directory
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        let path = config_dir.join("config.yaml");
        info!(config_dir = %config_dir.display(), "Using config directory");

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external_value: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
            }
        }

        let mut config_value = Self::lower_keys_value(default_value);
        Self::apply_env_overrides(&mut config_value, env::vars());

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        })
    }

    /// Builds a configuration from a YAML document merged over the embedded defaults.
    ///
    /// Environment overrides are not applied.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let external_value: Value = serde_yaml::from_str(yaml)?;
        merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));

        Ok(Config {
            config_dir: PathBuf::from(CONFIG_DIR_NAME),
            path: PathBuf::from(CONFIG_DIR_NAME).join("config.yaml"),
            data: Mutex::new(Self::lower_keys_value(default_value)),
        })
    }

    fn load_or_default(directory: &str) -> Self {
        match Self::load_config(directory) {
            Ok(config) => config,
            Err(err) => {
                warn!("Invalid configuration ({err}), falling back to embedded defaults");
                Self::from_yaml_str("{}").unwrap_or_else(|_| Config {
                    config_dir: PathBuf::from(CONFIG_DIR_NAME),
                    path: PathBuf::from(CONFIG_DIR_NAME).join("config.yaml"),
                    data: Mutex::new(Value::Mapping(Mapping::new())),
                })
            }
        }
    }

    /// Directory the configuration was resolved from
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Writes the current configuration to `config.yaml`, creating the directory if needed
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        let data = self.data.lock().expect("config mutex poisoned");
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path (in memory only)
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["host", "http_port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().expect("config mutex poisoned");
        Self::set_value_internal(&mut data, path, value)
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().expect("config mutex poisoned");
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides<I>(config: &mut Value, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, "Ignoring config override: {err}");
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(new_key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Gets the HTTP port of the media server
    ///
    /// Returns the configured port, or 8080 if not configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!("HTTP port {} out of range, using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => s.parse::<u16>().unwrap_or_else(|_| {
                warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                DEFAULT_HTTP_PORT
            }),
            Ok(_) | Err(_) => DEFAULT_HTTP_PORT,
        }
    }

    /// Gets the host advertised in media URLs
    ///
    /// Returns `host.base_url` when set, otherwise the detected LAN IPv4
    /// address, otherwise `localhost`.
    pub fn get_base_url(&self) -> String {
        match self.get_value(&["host", "base_url"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => lan_ipv4()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "localhost".to_string()),
        }
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            Ok(_) | Err(_) => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    impl_usize_config!(
        get_log_cache_size,
        &["host", "logger", "buffer_capacity"],
        DEFAULT_LOG_BUFFER_CAPACITY
    );

    impl_bool_config!(
        get_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    impl_duration_config!(
        get_discovery_timeout,
        &["discovery", "timeout_secs"],
        DEFAULT_DISCOVERY_TIMEOUT_SECS,
        Duration::from_secs
    );

    impl_duration_config!(
        get_discovery_detail_timeout,
        &["discovery", "detail_timeout_secs"],
        DEFAULT_DETAIL_TIMEOUT_SECS,
        Duration::from_secs
    );

    impl_usize_config!(
        get_discovery_max_concurrent_fetches,
        &["discovery", "max_concurrent_fetches"],
        DEFAULT_MAX_CONCURRENT_FETCHES
    );

    impl_string_list_config!(
        get_discovery_search_targets,
        &["discovery", "search_targets"],
        DEFAULT_SEARCH_TARGETS
    );

    impl_duration_config!(
        get_renderer_http_timeout,
        &["renderer", "http_timeout_secs"],
        DEFAULT_RENDERER_HTTP_TIMEOUT_SECS,
        Duration::from_secs
    );

    impl_duration_config!(
        get_renderer_settle_delay,
        &["renderer", "settle_delay_ms"],
        DEFAULT_SETTLE_DELAY_MS,
        Duration::from_millis
    );

    impl_duration_config!(
        get_renderer_heartbeat,
        &["renderer", "heartbeat_secs"],
        DEFAULT_HEARTBEAT_SECS,
        Duration::from_secs
    );

    impl_string_config!(get_ffmpeg_path, &["transcoder", "ffmpeg_path"], DEFAULT_FFMPEG_PATH);

    impl_string_config!(get_ffprobe_path, &["transcoder", "ffprobe_path"], DEFAULT_FFPROBE_PATH);

    impl_duration_config!(
        get_transcode_cache_ttl,
        &["transcoder", "cache_ttl_secs"],
        DEFAULT_CACHE_TTL_SECS,
        Duration::from_secs
    );

    impl_string_list_config!(
        get_preferred_subtitle_languages,
        &["transcoder", "preferred_subtitle_languages"],
        DEFAULT_SUBTITLE_LANGUAGES
    );

    impl_string_list_config!(
        get_audio_transcode_codecs,
        &["transcoder", "audio_transcode_codecs"],
        DEFAULT_AUDIO_TRANSCODE_CODECS
    );
}

/// Returns the global configuration instance
///
/// The configuration is lazily loaded on first access. An unreadable or
/// invalid `config.yaml` is reported and the embedded defaults are used.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings, keys from `external` are merged recursively into `default`
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
