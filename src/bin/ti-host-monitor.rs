use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use ti_host_bridge::util::ExecService;
use ti_host_bridge::{
    exit_code_for_bridge_error, init_tracing, BridgeConfig, BridgeError, HostMonitor, SignalSlot,
    SystemBrowser,
};

#[derive(Parser, Debug)]
#[command(
    name = "ti-host-monitor",
    version,
    about = "Watch a project's metadata directory and open requested URLs in a host browser."
)]
struct Args {
    /// Project directory to watch
    #[arg(conflicts_with = "project_dir")]
    project: Option<PathBuf>,

    /// Project directory to watch (default: TI_BRIDGE_PROJECT_DIR)
    #[arg(long = "project-dir")]
    project_dir: Option<PathBuf>,

    /// Seconds between polls (overrides configuration)
    #[arg(long = "poll-interval")]
    poll_interval: Option<u64>,

    /// Log every poll decision
    #[arg(long)]
    verbose: bool,
}

fn project_dir(args: &Args) -> Result<PathBuf, BridgeError> {
    let dir = args
        .project_dir
        .clone()
        .or_else(|| args.project.clone())
        .or_else(|| {
            env::var("TI_BRIDGE_PROJECT_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        })
        .ok_or(BridgeError::ProjectDirUnusable(None))?;
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(BridgeError::ProjectDirUnusable(Some(dir)))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing("info", args.verbose);

    let cfg = match BridgeConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(exit_code_for_bridge_error(&e));
        }
    };
    let project = match project_dir(&args) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(exit_code_for_bridge_error(&e));
        }
    };
    let interval = match args.poll_interval {
        Some(0) => {
            tracing::error!("--poll-interval must be a positive number of seconds");
            return ExitCode::from(1);
        }
        Some(secs) => Duration::from_secs(secs),
        None => cfg.poll_interval(),
    };

    let browser = SystemBrowser::new(
        cfg.browser_app_mode,
        cfg.browser_command.clone(),
        ExecService::new(cfg.launch_timeout()),
    );
    let slot = SignalSlot::in_metadata_dir(&cfg.metadata_dir_for(&project));
    HostMonitor::new(slot, browser, interval).run()
}
