//! Engine configuration loaded from TOML.

use std::path::Path;

use serde::Deserialize;

use crate::error::{HackError, Result};

/// Top-level engine configuration (`engine.toml`).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Idle time after which a cached session is evicted.
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,
    /// Interval between eviction sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Most recent history entries handed to objective predicates.
    /// `None` keeps the whole attempt history.
    #[serde(default)]
    pub max_history: Option<usize>,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Settings for the command interpreter and the mission flavor commands.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalConfig {
    /// Name printed by `whoami`.
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// The single key accepted by `decrypt`.
    #[serde(default = "default_decrypt_key")]
    pub decrypt_key: String,
    /// Targets `hack` knows how to breach.
    #[serde(default = "default_hack_targets")]
    pub hack_targets: Vec<String>,
    /// CVE identifiers `exploit` recognizes.
    #[serde(default = "default_known_exploits")]
    pub known_exploits: Vec<String>,
}

fn default_idle_timeout() -> u64 {
    30 * 60
}
fn default_sweep_interval() -> u64 {
    15 * 60
}
fn default_user_name() -> String {
    "hacker".to_string()
}
fn default_decrypt_key() -> String {
    "H4CK3R".to_string()
}
fn default_hack_targets() -> Vec<String> {
    vec![
        "mainframe".to_string(),
        "192.168.1.1".to_string(),
        "firewall".to_string(),
    ]
}
fn default_known_exploits() -> Vec<String> {
    vec![
        "CVE-2021-44228".to_string(),
        "CVE-2017-0144".to_string(),
        "CVE-2014-0160".to_string(),
    ]
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            decrypt_key: default_decrypt_key(),
            hack_targets: default_hack_targets(),
            known_exploits: default_known_exploits(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            max_history: None,
            terminal: TerminalConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        log::info!("Loaded engine config from {}", path.display());
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.session_idle_timeout_secs == 0 {
            return Err(HackError::Config(
                "session_idle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(HackError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_history == Some(0) {
            return Err(HackError::Config("max_history must be positive".to_string()));
        }
        if self.terminal.decrypt_key.is_empty() {
            return Err(HackError::Config("decrypt_key must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_values_are_sensible() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.session_idle_timeout_secs, 1800);
        assert_eq!(cfg.sweep_interval_secs, 900);
        assert_eq!(cfg.terminal.user_name, "hacker");
        assert_eq!(cfg.terminal.decrypt_key, "H4CK3R");
        assert!(cfg.terminal.hack_targets.contains(&"mainframe".to_string()));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.session_idle_timeout_secs, 1800);
        assert_eq!(cfg.terminal.known_exploits.len(), 3);
    }

    #[test]
    fn partial_override() {
        let cfg = EngineConfig::from_toml_str(
            r#"
session_idle_timeout_secs = 60

[terminal]
user_name = "neo"
"#,
        )
        .unwrap();
        assert_eq!(cfg.session_idle_timeout_secs, 60);
        assert_eq!(cfg.sweep_interval_secs, 900);
        assert_eq!(cfg.terminal.user_name, "neo");
        assert_eq!(cfg.terminal.decrypt_key, "H4CK3R");
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = EngineConfig::from_toml_str("session_idle_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, HackError::Config(_)));
    }

    #[test]
    fn history_window() {
        let cfg = EngineConfig::from_toml_str("max_history = 50").unwrap();
        assert_eq!(cfg.max_history, Some(50));
        assert!(EngineConfig::default().max_history.is_none());
        let err = EngineConfig::from_toml_str("max_history = 0").unwrap_err();
        assert!(matches!(err, HackError::Config(_)));
    }

    #[test]
    fn malformed_toml_rejected() {
        let err = EngineConfig::from_toml_str("[[[").unwrap_err();
        assert!(matches!(err, HackError::TomlParse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval_secs = 5").unwrap();
        let cfg = EngineConfig::load(file.path()).unwrap();
        assert_eq!(cfg.sweep_interval_secs, 5);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, HackError::Io(_)));
    }
}
