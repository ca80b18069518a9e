//! Error mapping guide:
//! - Map io::ErrorKind::NotFound to exit code 127; all others to 1.
//! - Bridge failures are reported, not propagated: only the CLI surfaces
//!   decide whether a failure changes the process exit code.
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 1 for all other errors
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    if e.kind() == io::ErrorKind::NotFound {
        127
    } else {
        1
    }
}

/// Errors surfaced by the `ti-bridge` and `ti-host-monitor` command lines.
#[derive(Debug)]
pub enum BridgeError {
    /// No usable project directory could be determined.
    ProjectDirUnusable(Option<PathBuf>),
    /// Configuration file could not be read or parsed.
    Config(String),
    Io(io::Error),
    Message(String),
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        BridgeError::Io(e)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::ProjectDirUnusable(Some(p)) => {
                write!(f, "project directory not usable: {}", p.display())
            }
            BridgeError::ProjectDirUnusable(None) => f.write_str(
                "no project directory given; pass --project-dir or set TI_BRIDGE_PROJECT_DIR",
            ),
            BridgeError::Config(msg) => write!(f, "configuration error: {msg}"),
            BridgeError::Io(e) => write!(f, "{e}"),
            BridgeError::Message(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Convert BridgeError to exit code (parity with io::Error mapping).
pub fn exit_code_for_bridge_error(e: &BridgeError) -> u8 {
    match e {
        BridgeError::Io(ioe) => exit_code_for_io_error(ioe),
        _ => 1,
    }
}
