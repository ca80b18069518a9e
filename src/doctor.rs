use std::env;
use std::path::Path;

use crate::color::{color_enabled_stderr, paint};
use crate::config::{config_path, BridgeConfig};
use crate::environment::{Environment, EnvironmentProbe};
use crate::signal::SignalSlot;
use crate::supervisor::{HostShells, MonitorSupervisor};

fn yes_no(use_color: bool, v: bool) -> String {
    let s = if v { "yes" } else { "no" };
    paint(use_color, "\x1b[34;1m", s)
}

fn or_unset(v: Option<&str>) -> &str {
    v.unwrap_or("(unset)")
}

fn show_path(p: Option<&Path>) -> String {
    p.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not found)".to_string())
}

/// Print host bridge diagnostics to stderr.
pub fn run_doctor(verbose: bool, cfg: &BridgeConfig) {
    let use_err = color_enabled_stderr();
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("ti-bridge doctor");
    eprintln!();
    eprintln!("  version: v{}", version);
    eprintln!(
        "  host:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if verbose {
        for (k, v) in crate::build_info() {
            eprintln!("  build {:<8} {}", format!("{k}:"), v);
        }
    }
    eprintln!();

    let environment = Environment::current();
    let probe = EnvironmentProbe::gather();
    eprintln!(
        "  environment: {}",
        paint(use_err, "\x1b[34;1m", environment.as_str())
    );
    eprintln!("    OS marker:            {}", or_unset(probe.os_marker.as_deref()));
    eprintln!("    WSL distribution:     {}", or_unset(probe.wsl_distro.as_deref()));
    let kernel = probe
        .kernel_version
        .as_deref()
        .map(|k| k.lines().next().unwrap_or("").trim().to_string());
    eprintln!("    kernel version:       {}", or_unset(kernel.as_deref()));
    eprintln!(
        "    Windows shell on PATH: {}",
        yes_no(use_err, probe.windows_shell_on_path)
    );
    eprintln!(
        "    path translation:     {}",
        yes_no(use_err, environment.needs_path_translation())
    );
    eprintln!();

    let shells = HostShells::discover(environment);
    eprintln!("  powershell: {}", show_path(shells.powershell.as_deref()));
    eprintln!("  cmd.exe:    {}", show_path(shells.cmd.as_deref()));
    eprintln!();

    let cfg_file = config_path();
    let cfg_state = match &cfg_file {
        Some(p) if p.is_file() => p.display().to_string(),
        Some(p) => format!("{} (absent, using defaults)", p.display()),
        None => "(no home directory, using defaults)".to_string(),
    };
    eprintln!("  config:           {}", cfg_state);
    eprintln!("    poll interval:  {}s", cfg.poll_interval_secs);
    eprintln!("    settle delay:   {}ms", cfg.settle_delay_ms);
    eprintln!("    launch timeout: {}s", cfg.launch_timeout_secs);
    eprintln!("    app mode:       {}", yes_no(use_err, cfg.browser_app_mode));
    if let Some(cmd) = &cfg.browser_command {
        eprintln!("    browser:        {}", crate::util::shell_join(cmd));
    }

    let project = env::var("TI_BRIDGE_PROJECT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(std::path::PathBuf::from)
        .or_else(|| env::current_dir().ok());
    if let Some(project) = project {
        let slot = SignalSlot::in_metadata_dir(&cfg.metadata_dir_for(&project));
        let pending = slot.path().is_file();
        eprintln!("  trigger file:     {}", slot.path().display());
        eprintln!("    pending:        {}", yes_no(use_err, pending));
    }
    eprintln!();

    let supervisor = MonitorSupervisor::for_host(environment, cfg);
    let status = supervisor.status();
    if status.is_empty() {
        eprintln!("  monitors: not applicable ({environment})");
    } else {
        for (identity, count) in status {
            match count {
                Ok(n) => eprintln!("  monitors ({identity}): {n}"),
                Err(e) => eprintln!("  monitors ({identity}): unknown ({e:#})"),
            }
        }
    }
    eprintln!();
    eprintln!("doctor: completed diagnostics.");
}
