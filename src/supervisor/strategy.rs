use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use which::which;

use super::artifact::MonitorLaunch;
use crate::environment::Environment;
use crate::util::{reject_newlines, spawn_detached, ExecRequest, ExecService};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    /// Ask a host shell to start the monitor (`Start-Process` or `start /B`).
    HostShell,
    /// Spawn the monitor directly in its own session.
    DirectSpawn,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::HostShell => "host-shell",
            StrategyKind::DirectSpawn => "direct-spawn",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a start attempt reported before verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub exit_code: Option<i32>,
    pub output: String,
}

/// One way of starting a monitor detached from the launcher.
///
/// `start` returning `Ok` only means the attempt was made; the supervisor
/// decides success by looking for the process afterwards.
pub trait DetachedStart {
    fn kind(&self) -> StrategyKind;
    fn start(&self, launch: &MonitorLaunch) -> Result<LaunchReport>;
}

/// Windows command interpreters reachable from here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostShells {
    pub powershell: Option<PathBuf>,
    pub cmd: Option<PathBuf>,
}

impl HostShells {
    /// Look up PowerShell and cmd.exe on PATH when a Windows host is present.
    pub fn discover(env: Environment) -> Self {
        if !env.has_windows_host() {
            return Self::default();
        }
        Self {
            powershell: which("powershell.exe").or_else(|_| which("pwsh.exe")).ok(),
            cmd: which("cmd.exe").ok(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.powershell.is_none() && self.cmd.is_none()
    }

    /// Name used inside host command lines for the PowerShell interpreter.
    pub fn powershell_program(&self) -> String {
        self.powershell
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "powershell.exe".to_string())
    }
}

/// Strategy A: hand the launch to a host shell.
#[derive(Debug, Clone)]
pub struct HostShellStart {
    shells: HostShells,
    exec: ExecService,
}

impl HostShellStart {
    pub fn new(shells: HostShells, exec: ExecService) -> Self {
        Self { shells, exec }
    }

    /// The exact request this strategy would run.
    pub fn request(&self, launch: &MonitorLaunch) -> Result<ExecRequest> {
        if let Some(ps) = &self.shells.powershell {
            return Ok(ExecRequest::new(ps)
                .args(["-NoProfile", "-NonInteractive", "-Command"])
                .arg(launch.start_process_script()));
        }
        if let Some(cmd) = &self.shells.cmd {
            // `start /B` hands our stdio to the monitor; a captured pipe would
            // never reach EOF.
            return Ok(ExecRequest::new(cmd)
                .args(["/C", "start", "", "/B"])
                .arg(&launch.host_program)
                .args(launch.args.iter())
                .capture_output(false));
        }
        Err(anyhow!("no Windows shell available"))
    }
}

impl DetachedStart for HostShellStart {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HostShell
    }

    fn start(&self, launch: &MonitorLaunch) -> Result<LaunchReport> {
        check_launch(launch)?;
        let out = self.exec.run(self.request(launch)?)?;
        Ok(LaunchReport {
            exit_code: out.code(),
            output: out.combined(),
        })
    }
}

/// Strategy B: spawn the monitor (or its interpreter) ourselves.
#[derive(Debug, Clone, Default)]
pub struct DirectSpawn;

impl DetachedStart for DirectSpawn {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectSpawn
    }

    fn start(&self, launch: &MonitorLaunch) -> Result<LaunchReport> {
        check_launch(launch)?;
        let pid = spawn_detached(OsStr::new(&launch.local_program), launch.args.as_slice())
            .map_err(|e| anyhow!("failed to spawn {}: {e}", launch.local_program))?;
        Ok(LaunchReport {
            exit_code: None,
            output: format!("spawned pid {pid}"),
        })
    }
}

fn check_launch(launch: &MonitorLaunch) -> Result<()> {
    reject_newlines(&launch.host_program, "monitor command").map_err(|e| anyhow!(e))?;
    for a in &launch.args {
        reject_newlines(a, "monitor command").map_err(|e| anyhow!(e))?;
    }
    Ok(())
}
