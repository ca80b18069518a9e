#![allow(clippy::module_name_repetitions)]
//! ti-host-bridge: open browser windows on a Windows host on behalf of a
//! containerised application.
//!
//! The container posts a [`Signal`] into a per-project metadata directory;
//! the host-side [`HostMonitor`] polls that slot and launches the browser.
//! The [`MonitorSupervisor`] starts, verifies and stops the monitor from the
//! launcher side, across native Linux/macOS, Windows and WSL.

pub mod color;
pub mod config;
pub mod doctor;
pub mod environment;
pub mod errors;
pub mod monitor;
pub mod paths;
pub mod signal;
pub mod supervisor;
pub mod telemetry;
pub mod util;

pub use color::*;
pub use config::{config_path, BridgeConfig, DEFAULT_METADATA_DIR};
pub use environment::{classify, Environment, EnvironmentProbe, KernelFamily};
pub use errors::*;
pub use monitor::{BrowserLauncher, HostMonitor, SystemBrowser, TickOutcome};
pub use paths::{is_wsl_mount_path, to_windows_path, to_wsl_path};
pub use signal::{ClearOutcome, Malformed, Signal, SignalSlot, Snapshot, TRIGGER_FILE_NAME};
pub use supervisor::{
    Attempt, DetachedStart, FlavorStop, HostShells, LaunchReport, MonitorArtifact,
    MonitorFlavor, MonitorLaunch, MonitorSupervisor, ProcessIdentity, ProcessTable,
    StartFailure, StartOutcome, StopReport, StrategyKind,
};
pub use telemetry::init_tracing;

/// Build metadata baked in by build.rs.
pub fn build_info() -> [(&'static str, &'static str); 4] {
    [
        ("date", env!("TI_BRIDGE_BUILD_DATE")),
        ("target", env!("TI_BRIDGE_BUILD_TARGET")),
        ("profile", env!("TI_BRIDGE_BUILD_PROFILE")),
        ("rustc", env!("TI_BRIDGE_BUILD_RUSTC")),
    ]
}
