//! Bridge configuration: optional YAML file, then environment overrides.
//!
//! File location: `TI_BRIDGE_CONFIG` when set and non-empty, else
//! `~/.ti-bridge.yml`. A missing file yields defaults; a file that exists but
//! cannot be read or parsed is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::BridgeError;

/// Name of the hidden per-project metadata directory.
pub const DEFAULT_METADATA_DIR: &str = ".ti-csc-info";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Monitor poll cadence.
    pub poll_interval_secs: u64,
    /// Wait after each start strategy before enumerating host processes.
    pub settle_delay_ms: u64,
    pub metadata_dir: String,
    /// Prefer a Chromium-family browser in `--app=` mode.
    pub browser_app_mode: bool,
    /// Explicit browser argv; `{url}` is replaced, or the URL is appended.
    pub browser_command: Option<Vec<String>>,
    /// Upper bound for host launch requests and process queries.
    pub launch_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            settle_delay_ms: 3000,
            metadata_dir: DEFAULT_METADATA_DIR.to_string(),
            browser_app_mode: true,
            browser_command: None,
            launch_timeout_secs: 15,
        }
    }
}

impl BridgeConfig {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<BridgeConfig, BridgeError> {
        let mut cfg = match config_path() {
            Some(p) => Self::from_file(&p)?,
            None => BridgeConfig::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Parse a config file; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<BridgeConfig, BridgeError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BridgeConfig::default())
            }
            Err(e) => {
                return Err(BridgeError::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        if content.trim().is_empty() {
            return Ok(BridgeConfig::default());
        }
        let cfg: BridgeConfig = serde_yaml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `TI_BRIDGE_*` overrides through an injectable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(v) = get("TI_BRIDGE_POLL_SECS") {
            self.poll_interval_secs = parse_u64("TI_BRIDGE_POLL_SECS", &v)?;
        }
        if let Some(v) = get("TI_BRIDGE_SETTLE_MS") {
            self.settle_delay_ms = parse_u64("TI_BRIDGE_SETTLE_MS", &v)?;
        }
        if let Some(v) = get("TI_BRIDGE_METADATA_DIR") {
            self.metadata_dir = v;
        }
        if let Some(v) = get("TI_BRIDGE_BROWSER_APP_MODE") {
            self.browser_app_mode = match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(BridgeError::Config(format!(
                        "TI_BRIDGE_BROWSER_APP_MODE: expected a boolean, got '{v}'"
                    )))
                }
            };
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.poll_interval_secs == 0 {
            return Err(BridgeError::Config(
                "poll_interval_secs must be a positive integer".to_string(),
            ));
        }
        if self.launch_timeout_secs == 0 {
            return Err(BridgeError::Config(
                "launch_timeout_secs must be a positive integer".to_string(),
            ));
        }
        let md = self.metadata_dir.trim();
        if md.is_empty() || md.contains('/') || md.contains('\\') || md == "." || md == ".." {
            return Err(BridgeError::Config(format!(
                "metadata_dir must be a single directory name, got '{}'",
                self.metadata_dir
            )));
        }
        if let Some(cmd) = &self.browser_command {
            if cmd.is_empty() || cmd[0].trim().is_empty() {
                return Err(BridgeError::Config(
                    "browser_command must name an executable".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    /// `<project>/<metadata_dir>`.
    pub fn metadata_dir_for(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.metadata_dir)
    }
}

fn parse_u64(key: &str, v: &str) -> Result<u64, BridgeError> {
    v.parse::<u64>()
        .map_err(|_| BridgeError::Config(format!("{key}: expected a non-negative integer, got '{v}'")))
}

/// Config file location, if one can be determined.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("TI_BRIDGE_CONFIG") {
        let p = p.trim();
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    home::home_dir().map(|h| h.join(".ti-bridge.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_yields_defaults() {
        let td = tempfile::tempdir().expect("tmpdir");
        let cfg = BridgeConfig::from_file(&td.path().join("nope.yml")).expect("defaults");
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_yaml_overrides_subset() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("bridge.yml");
        fs::write(
            &p,
            "poll_interval_secs: 5\nbrowser_app_mode: false\nbrowser_command: [\"firefox\", \"--new-window\", \"{url}\"]\n",
        )
        .unwrap();
        let cfg = BridgeConfig::from_file(&p).expect("parse");
        assert_eq!(cfg.poll_interval_secs, 5);
        assert!(!cfg.browser_app_mode);
        assert_eq!(cfg.browser_command.as_ref().map(|c| c.len()), Some(3));
        assert_eq!(cfg.metadata_dir, DEFAULT_METADATA_DIR);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("bridge.yml");
        fs::write(&p, "poll_interval: 5\n").unwrap();
        let err = BridgeConfig::from_file(&p).expect_err("unknown key");
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_env_overrides_and_validation() {
        let env: HashMap<&str, &str> = [
            ("TI_BRIDGE_POLL_SECS", "7"),
            ("TI_BRIDGE_SETTLE_MS", " 250 "),
            ("TI_BRIDGE_BROWSER_APP_MODE", "off"),
        ]
        .into_iter()
        .collect();
        let mut cfg = BridgeConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()))
            .expect("apply env");
        assert_eq!(cfg.poll_interval_secs, 7);
        assert_eq!(cfg.settle_delay(), Duration::from_millis(250));
        assert!(!cfg.browser_app_mode);

        let mut bad = BridgeConfig::default();
        let err = bad
            .apply_env(|k| (k == "TI_BRIDGE_POLL_SECS").then(|| "0".to_string()))
            .expect_err("zero poll interval");
        assert!(err.to_string().contains("poll_interval_secs"), "{err}");
    }

    #[test]
    fn test_zero_launch_timeout_rejected() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("bridge.yml");
        fs::write(&p, "launch_timeout_secs: 0\n").unwrap();
        let err = BridgeConfig::from_file(&p).expect_err("zero launch timeout");
        assert!(err.to_string().contains("launch_timeout_secs"), "{err}");
    }

    #[test]
    fn test_metadata_dir_must_be_single_component() {
        let mut cfg = BridgeConfig::default();
        let err = cfg
            .apply_env(|k| (k == "TI_BRIDGE_METADATA_DIR").then(|| "a/b".to_string()))
            .expect_err("nested metadata dir");
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
