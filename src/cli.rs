use std::path::PathBuf;

use clap::{Parser, Subcommand};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt:  ",
    env!("TI_BRIDGE_BUILD_DATE"),
    "\ntarget: ",
    env!("TI_BRIDGE_BUILD_TARGET"),
    " (",
    env!("TI_BRIDGE_BUILD_PROFILE"),
    ")\nrustc:  ",
    env!("TI_BRIDGE_BUILD_RUSTC"),
);

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Start the host monitor for a project and verify it is running
    Start {
        /// Monitor artifact: ti-host-monitor(.exe) or a .ps1 monitor script
        #[arg(long)]
        monitor: PathBuf,
        /// Project directory whose metadata directory the monitor watches
        #[arg(long = "project-dir")]
        project_dir: PathBuf,
        /// Exit 1 when the bridge could not be established
        #[arg(long)]
        strict: bool,
    },

    /// Terminate every running host monitor
    Stop {
        /// Also stop monitors deployed under this artifact's name (repeatable)
        #[arg(long)]
        monitor: Vec<PathBuf>,
    },

    /// Show running host monitors per flavor
    Status {
        /// Also count monitors deployed under this artifact's name (repeatable)
        #[arg(long)]
        monitor: Vec<PathBuf>,
    },

    /// Print the execution environment classification
    Env,

    /// Translate a WSL mount path to its Windows form (or back with --reverse)
    Translate {
        path: String,
        /// Windows path to WSL mount path
        #[arg(long)]
        reverse: bool,
    },

    /// Post a browser launch request for the host monitor
    Trigger {
        /// http(s) URL to open on the host
        #[arg(long)]
        url: String,
        /// Project directory (default: TI_BRIDGE_PROJECT_DIR, else the current directory)
        #[arg(long = "project-dir")]
        project_dir: Option<PathBuf>,
    },

    /// Start the bridge, run a command, then stop all monitors
    #[command(
        after_long_help = "Examples:\n  ti-bridge run --monitor /mnt/c/ti/ti-host-monitor.exe --project-dir . -- ./launch-gui.sh\n"
    )]
    Run {
        #[arg(long)]
        monitor: PathBuf,
        #[arg(long = "project-dir")]
        project_dir: PathBuf,
        /// Command and arguments to run (after --)
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Run diagnostics for the host bridge
    Doctor,
}

#[derive(Parser, Debug)]
#[command(
    name = "ti-bridge",
    version,
    long_version = LONG_VERSION,
    about = "Start, verify and stop the host browser monitor for a containerised GUI.",
    after_long_help = "Examples:\n  ti-bridge start --monitor /mnt/c/ti/ti-host-monitor.exe --project-dir ~/study\n  ti-bridge trigger --url http://localhost:8080 --project-dir ~/study\n  ti-bridge stop\n"
)]
pub(crate) struct Cli {
    /// Print detailed execution info
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<ti_host_bridge::ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}
