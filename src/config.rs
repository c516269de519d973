//! Configuration loader and validator for the SMS ledger.
use crate::ingest::{TimestampPolicy, DEFAULT_CATEGORY};
use crate::sender::{SenderClassifier, DEFAULT_BANK_SENDERS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub ingest: Ingest,
    #[serde(default)]
    pub live: Live,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
        }
    }
}

/// Settings shared by batch and live ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Ingest {
    /// Sender tokens recognised as bank channels (case-insensitive substrings).
    pub bank_senders: Vec<String>,
    pub default_category: String,
    /// Candidates persisted at once during a batch run.
    pub concurrency: usize,
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            bank_senders: DEFAULT_BANK_SENDERS.iter().map(|s| s.to_string()).collect(),
            default_category: DEFAULT_CATEGORY.into(),
            concurrency: 1,
        }
    }
}

/// Live listener behaviour. The defaults keep the listener stamping records
/// with processing time and accepting any sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Live {
    pub use_message_timestamp: bool,
    pub apply_sender_filter: bool,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn default_database_url(&self) -> String {
        format!(
            "sqlite://{}/ledger.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }

    pub fn sender_classifier(&self) -> SenderClassifier {
        SenderClassifier::new(&self.ingest.bank_senders)
    }

    pub fn live_policy(&self) -> TimestampPolicy {
        TimestampPolicy::from_use_message_timestamp(self.live.use_message_timestamp)
    }

    pub fn live_sender_filter(&self) -> Option<SenderClassifier> {
        self.live
            .apply_sender_filter
            .then(|| self.sender_classifier())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Like `load`, but a missing file yields the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match load(path) {
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(Config::default())
        }
        other => other,
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.ingest.bank_senders.is_empty() {
        return Err(ConfigError::Invalid("ingest.bank_senders must list at least one sender"));
    }
    if cfg.ingest.bank_senders.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::Invalid("ingest.bank_senders entries must be non-empty"));
    }
    if cfg.ingest.default_category.trim().is_empty() {
        return Err(ConfigError::Invalid("ingest.default_category must be non-empty"));
    }
    if cfg.ingest.concurrency == 0 {
        return Err(ConfigError::Invalid("ingest.concurrency must be > 0"));
    }
    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

ingest:
  bank_senders:
    - HDFCBK
    - ICICIBANK
    - SBIINB
    - AXISBK
    - KOTAK
    - YESBANK
  default_category: "CASH"
  concurrency: 1

live:
  use_message_timestamp: false
  apply_sender_filter: false
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn omitted_sections_take_defaults() {
        let cfg: Config = serde_yaml::from_str("app:\n  data_dir: /tmp/x\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.ingest, Ingest::default());
        assert_eq!(cfg.live_policy(), TimestampPolicy::ProcessingTime);
        assert!(cfg.live_sender_filter().is_none());
        assert_eq!(cfg.default_database_url(), "sqlite:///tmp/x/ledger.db");
    }

    #[test]
    fn custom_senders_reach_the_classifier() {
        let yaml = "app:\n  data_dir: d\ningest:\n  bank_senders: [PNBSMS]\nlive:\n  apply_sender_filter: true\n  use_message_timestamp: true\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.sender_classifier().is_bank_sender("VK-PNBSMS"));
        assert!(!cfg.sender_classifier().is_bank_sender("HDFCBK"));
        assert!(cfg.live_sender_filter().is_some());
        assert_eq!(cfg.live_policy(), TimestampPolicy::MessageTimestamp);
    }

    #[test]
    fn invalid_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.ingest.bank_senders.clear();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.ingest.bank_senders.push("".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.ingest.default_category = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.ingest.concurrency = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.ingest.bank_senders.len(), 6);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let td = tempdir().unwrap();
        let cfg = load_or_default(Some(&td.path().join("absent.yaml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }
}
