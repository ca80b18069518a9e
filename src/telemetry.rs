//! Tracing initialisation shared by both binaries.
//!
//! Filter precedence: `TI_BRIDGE_LOG`, then `RUST_LOG`, then the caller's
//! default (raised to `debug` by `--verbose`). Output goes to stderr and
//! follows the same color policy as the operator messages.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

fn env_filter(default_directive: &str, verbose: bool) -> EnvFilter {
    if let Ok(v) = std::env::var("TI_BRIDGE_LOG") {
        if let Ok(f) = EnvFilter::try_new(v.trim()) {
            if !v.trim().is_empty() {
                return f;
            }
        }
    }
    if let Ok(f) = EnvFilter::try_from_default_env() {
        return f;
    }
    EnvFilter::new(if verbose { "debug" } else { default_directive })
}

/// Install the global fmt subscriber once; later calls are no-ops.
pub fn init_tracing(default_directive: &str, verbose: bool) {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter(default_directive, verbose))
            .with_writer(std::io::stderr)
            .with_ansi(crate::color::color_enabled_stderr())
            .with_target(false)
            .try_init();
    });
}
