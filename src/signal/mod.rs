//! The browser-launch signal exchanged across the container/host boundary.
//!
//! On disk a signal is a small JSON document:
//!
//! ```json
//! {"action": "launch_browser", "url": "http://localhost:8080", "timestamp": 1718000000.25}
//! ```
//!
//! Only `launch_browser` is honoured. `timestamp` is seconds since the Unix
//! epoch; when absent the file modification time stands in for it.

mod slot;

pub use slot::{ClearOutcome, SignalSlot, Snapshot, TRIGGER_FILE_NAME};

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

/// The one action the host monitor performs.
pub const ACTION_LAUNCH_BROWSER: &str = "launch_browser";

/// Wire form of the trigger file. Fields are optional so that incomplete
/// documents parse and can be reported precisely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// A validated navigation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub target_url: Url,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: f64,
}

/// Why a trigger file was not acted upon.
#[derive(Debug, Clone, PartialEq)]
pub enum Malformed {
    /// Not valid JSON (possibly a write in progress).
    Unparsable(String),
    MissingAction,
    UnknownAction(String),
    MissingUrl,
    InvalidUrl { url: String, reason: String },
    UnsupportedScheme(String),
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformed::Unparsable(e) => write!(f, "trigger file is not valid JSON: {e}"),
            Malformed::MissingAction => f.write_str("trigger file has no 'action'"),
            Malformed::UnknownAction(a) => write!(f, "unrecognized action '{a}'"),
            Malformed::MissingUrl => f.write_str("trigger file has no 'url'"),
            Malformed::InvalidUrl { url, reason } => write!(f, "invalid url '{url}': {reason}"),
            Malformed::UnsupportedScheme(s) => {
                write!(f, "url scheme '{s}' is not allowed (http/https only)")
            }
        }
    }
}

impl Signal {
    /// Build a fresh `launch_browser` signal stamped with the current time.
    pub fn launch(url: &str) -> Result<Signal, Malformed> {
        let target_url = validate_url(url)?;
        Ok(Signal {
            target_url,
            created_at: unix_now(),
        })
    }

    /// Validate a decoded document. `fallback_stamp` is used when the
    /// document carries no timestamp (normally the file mtime).
    pub fn from_raw(raw: &RawSignal, fallback_stamp: f64) -> Result<Signal, Malformed> {
        match raw.action.as_deref().map(str::trim) {
            None | Some("") => return Err(Malformed::MissingAction),
            Some(ACTION_LAUNCH_BROWSER) => {}
            Some(other) => return Err(Malformed::UnknownAction(other.to_string())),
        }
        let url = match raw.url.as_deref().map(str::trim) {
            None | Some("") => return Err(Malformed::MissingUrl),
            Some(u) => u,
        };
        let target_url = validate_url(url)?;
        let created_at = raw
            .timestamp
            .filter(|t| t.is_finite())
            .unwrap_or(fallback_stamp);
        Ok(Signal {
            target_url,
            created_at,
        })
    }

    /// Decode and validate trigger-file bytes.
    pub fn parse(bytes: &[u8], fallback_stamp: f64) -> Result<Signal, Malformed> {
        let raw: RawSignal =
            serde_json::from_slice(bytes).map_err(|e| Malformed::Unparsable(e.to_string()))?;
        Signal::from_raw(&raw, fallback_stamp)
    }

    pub fn to_raw(&self) -> RawSignal {
        RawSignal {
            action: Some(ACTION_LAUNCH_BROWSER.to_string()),
            url: Some(self.target_url.to_string()),
            timestamp: Some(self.created_at),
        }
    }
}

fn validate_url(url: &str) -> Result<Url, Malformed> {
    let parsed = Url::parse(url).map_err(|e| Malformed::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Malformed::UnsupportedScheme(other.to_string())),
    }
}

pub(crate) fn unix_now() -> f64 {
    system_time_secs(SystemTime::now())
}

pub(crate) fn system_time_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
