use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/console.json";
const CLIENT_ID_PREFIX: &str = "neobot-console";

/// Public brokers drop the older session when a second client connects with
/// the same id, so each console instance gets its own.
fn unique_client_id() -> String {
    format!("{CLIENT_ID_PREFIX}-{}-{:08x}", std::process::id(), rand::random::<u32>())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub keep_alive_sec: u64,
    pub reconnect_delay_ms: u64,
    pub publish_timeout_ms: u64,
    pub http_addr: String,
    pub static_dir: PathBuf,
    pub log_capacity: usize,
    pub stale_after_ms: u64,
    pub axis_length: f64,
    pub simulate: bool,
    pub simulator_period_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            broker_host: "broker.hivemq.com".to_string(),
            broker_port: 1883,
            client_id: unique_client_id(),
            keep_alive_sec: 30,
            reconnect_delay_ms: 2_000,
            publish_timeout_ms: 500,
            http_addr: "0.0.0.0:3000".to_string(),
            static_dir: PathBuf::from("./renderer"),
            log_capacity: 1024,
            stale_after_ms: 5_000,
            axis_length: 1.5,
            simulate: false,
            simulator_period_ms: 100,
        }
    }
}

impl ConsoleConfig {
    /// File (if any) first, then `NEOBOT_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match config_path() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEOBOT_BROKER_HOST") {
            self.broker_host = v;
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_BROKER_PORT")? {
            self.broker_port = v;
        }
        if let Some(v) = lookup("NEOBOT_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_KEEP_ALIVE_SEC")? {
            self.keep_alive_sec = v;
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_RECONNECT_DELAY_MS")? {
            self.reconnect_delay_ms = v;
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_PUBLISH_TIMEOUT_MS")? {
            self.publish_timeout_ms = v;
        }
        if let Some(v) = lookup("NEOBOT_HTTP_ADDR") {
            self.http_addr = v;
        }
        if let Some(v) = lookup("NEOBOT_STATIC_DIR") {
            self.static_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_LOG_CAPACITY")? {
            self.log_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_STALE_AFTER_MS")? {
            self.stale_after_ms = v;
        }
        if let Some(v) = parsed(&lookup, "NEOBOT_AXIS_LENGTH")? {
            self.axis_length = v;
        }
        if let Some(v) = lookup("NEOBOT_SIMULATE") {
            self.simulate = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker_host is empty".into()));
        }
        if self.broker_port == 0 {
            return Err(ConfigError::Invalid("broker_port must be non-zero".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client_id is empty".into()));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::Invalid("log_capacity must be non-zero".into()));
        }
        if !(self.axis_length.is_finite() && self.axis_length > 0.0) {
            return Err(ConfigError::Invalid("axis_length must be positive".into()));
        }
        if self.publish_timeout_ms == 0 {
            return Err(ConfigError::Invalid("publish_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_sec)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn broker_label(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }
}

fn parsed<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NEOBOT_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let bundled = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
    bundled.exists().then_some(bundled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn bundled_config_is_valid() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let cfg = ConsoleConfig::from_file(&path).expect("bundled config should parse");
        cfg.validate().expect("bundled config should validate");
        assert_eq!(cfg.broker_port, 1883);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = ConsoleConfig::default();
        cfg.apply_overrides(lookup_from(&[
            ("NEOBOT_BROKER_HOST", "10.0.0.7"),
            ("NEOBOT_BROKER_PORT", "1884"),
            ("NEOBOT_SIMULATE", "1"),
            ("NEOBOT_AXIS_LENGTH", "2.0"),
        ]))
        .unwrap();

        assert_eq!(cfg.broker_host, "10.0.0.7");
        assert_eq!(cfg.broker_port, 1884);
        assert!(cfg.simulate);
        assert_eq!(cfg.axis_length, 2.0);
        assert!(cfg.client_id.starts_with("neobot-console-"));
        assert_eq!(cfg.broker_label(), "10.0.0.7:1884");
    }

    #[test]
    fn each_console_gets_its_own_client_id() {
        let first = ConsoleConfig::default();
        let second = ConsoleConfig::default();
        assert_ne!(first.client_id, second.client_id);
        assert!(first.client_id.starts_with("neobot-console-"));

        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let bundled = ConsoleConfig::from_file(&path).unwrap();
        assert_ne!(bundled.client_id, "neobot-console");
        assert!(bundled.client_id.starts_with("neobot-console-"));

        let mut pinned = ConsoleConfig::default();
        pinned
            .apply_overrides(lookup_from(&[("NEOBOT_CLIENT_ID", "bench-console")]))
            .unwrap();
        assert_eq!(pinned.client_id, "bench-console");

        let mut blank = ConsoleConfig::default();
        blank.apply_overrides(lookup_from(&[("NEOBOT_CLIENT_ID", " ")])).unwrap();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn unparsable_override_is_reported() {
        let mut cfg = ConsoleConfig::default();
        let err = cfg
            .apply_overrides(lookup_from(&[("NEOBOT_BROKER_PORT", "eighteen")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "NEOBOT_BROKER_PORT",
                ..
            }
        ));
    }

    #[test]
    fn validation_rejects_nonsense() {
        let cfg = ConsoleConfig {
            broker_port: 0,
            ..ConsoleConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = ConsoleConfig {
            axis_length: -1.0,
            ..ConsoleConfig::default()
        };
        assert!(cfg.validate().is_err());

        assert!(ConsoleConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: ConsoleConfig = serde_json::from_str(r#"{"broker_host":"localhost"}"#).unwrap();
        assert_eq!(cfg.broker_host, "localhost");
        assert_eq!(cfg.publish_timeout(), Duration::from_millis(500));
    }
}
