//! Monitor supervisor: start, verify and stop the host monitor.
//!
//! Start is a bounded sequence of attempts (host shell, then direct spawn),
//! each followed by a settle delay and a process-table check. Stop is
//! best-effort and never fails the caller's teardown.

mod artifact;
mod process_table;
mod strategy;

pub use artifact::{
    MonitorArtifact, MonitorFlavor, MonitorLaunch, ProcessIdentity, NATIVE_MONITOR_NAME,
    POWERSHELL_MONITOR_SCRIPT,
};
pub use process_table::{cim_query, parse_tasklist_csv, ProcessTable, WindowsProcessTable};
pub use strategy::{
    DetachedStart, DirectSpawn, HostShellStart, HostShells, LaunchReport, StrategyKind,
};

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::environment::Environment;
use crate::util::ExecService;

/// Why a start could not produce a running monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartFailure {
    ArtifactMissing { path: PathBuf },
    /// Neither PowerShell nor cmd.exe is reachable.
    InterpreterUnavailable { manual: String },
    /// Every strategy ran but no monitor process appeared.
    Unverified { manual: String, attempts: Vec<Attempt> },
}

impl StartFailure {
    /// Command the operator can run by hand, when one can be built.
    pub fn manual_command(&self) -> Option<&str> {
        match self {
            StartFailure::ArtifactMissing { .. } => None,
            StartFailure::InterpreterUnavailable { manual }
            | StartFailure::Unverified { manual, .. } => Some(manual),
        }
    }
}

impl fmt::Display for StartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartFailure::ArtifactMissing { path } => {
                write!(f, "monitor not found at {}", path.display())
            }
            StartFailure::InterpreterUnavailable { manual } => write!(
                f,
                "no Windows shell (powershell.exe or cmd.exe) is reachable; start the monitor manually:\n  {manual}"
            ),
            StartFailure::Unverified { manual, attempts } => {
                write!(
                    f,
                    "monitor did not appear after {} start attempt(s); start it manually:\n  {manual}",
                    attempts.len()
                )
            }
        }
    }
}

/// Result of `MonitorSupervisor::start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// No Windows host to bridge to.
    NotApplicable { environment: Environment },
    AlreadyRunning { instances: usize },
    Started { via: StrategyKind, instances: usize },
    Failed(StartFailure),
}

impl StartOutcome {
    /// True for every outcome that leaves the bridge usable or unnecessary.
    pub fn is_ok(&self) -> bool {
        !matches!(self, StartOutcome::Failed(_))
    }
}

/// One start attempt and what verification found afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub strategy: StrategyKind,
    pub report: Result<LaunchReport, String>,
    pub instances: usize,
}

impl Attempt {
    pub fn verified(&self) -> bool {
        self.instances > 0
    }
}

/// Result of `stop` for one monitor identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlavorStop {
    pub found: usize,
    pub terminated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub monitors: Vec<(ProcessIdentity, FlavorStop)>,
}

impl StopReport {
    pub fn terminated(&self) -> usize {
        self.monitors.iter().map(|(_, s)| s.terminated).sum()
    }

    pub fn terminated_for(&self, flavor: MonitorFlavor) -> usize {
        self.monitors
            .iter()
            .filter(|(id, _)| id.flavor == flavor)
            .map(|(_, s)| s.terminated)
            .sum()
    }

    pub fn has_errors(&self) -> bool {
        self.monitors.iter().any(|(_, s)| !s.errors.is_empty())
    }
}

pub struct MonitorSupervisor {
    env: Environment,
    shells: HostShells,
    table: Box<dyn ProcessTable>,
    strategies: Vec<Box<dyn DetachedStart>>,
    settle: Duration,
    /// Artifact identities seen by `start` or `track` beyond the defaults.
    tracked: RefCell<Vec<ProcessIdentity>>,
}

impl MonitorSupervisor {
    pub fn new(
        env: Environment,
        shells: HostShells,
        table: Box<dyn ProcessTable>,
        strategies: Vec<Box<dyn DetachedStart>>,
        settle: Duration,
    ) -> Self {
        Self {
            env,
            shells,
            table,
            strategies,
            settle,
            tracked: RefCell::new(Vec::new()),
        }
    }

    /// Supervisor wired to the real host: discovered shells, the Windows
    /// process table, host-shell start followed by direct spawn.
    pub fn for_host(env: Environment, cfg: &BridgeConfig) -> Self {
        let exec = ExecService::new(cfg.launch_timeout());
        let shells = HostShells::discover(env);
        let table = WindowsProcessTable::new(shells.powershell.clone(), exec.clone());
        let strategies: Vec<Box<dyn DetachedStart>> = vec![
            Box::new(HostShellStart::new(shells.clone(), exec)),
            Box::new(DirectSpawn),
        ];
        Self::new(env, shells, Box::new(table), strategies, cfg.settle_delay())
    }

    pub fn environment(&self) -> Environment {
        self.env
    }

    pub fn shells(&self) -> &HostShells {
        &self.shells
    }

    /// Also match monitors deployed as `monitor_path` in `stop` and `status`.
    pub fn track(&self, monitor_path: &Path) {
        self.track_identity(MonitorArtifact::new(monitor_path).identity());
    }

    fn track_identity(&self, identity: ProcessIdentity) {
        let is_default = MonitorFlavor::ALL
            .iter()
            .any(|f| f.default_identity() == identity);
        let mut tracked = self.tracked.borrow_mut();
        if !is_default && !tracked.contains(&identity) {
            debug!(monitor = %identity, "tracking monitor identity");
            tracked.push(identity);
        }
    }

    /// Default flavor identities followed by tracked ones.
    pub fn identities(&self) -> Vec<ProcessIdentity> {
        let mut all: Vec<ProcessIdentity> = MonitorFlavor::ALL
            .iter()
            .map(MonitorFlavor::default_identity)
            .collect();
        all.extend(self.tracked.borrow().iter().cloned());
        all
    }

    /// Start the monitor at `monitor_path` watching `project_path`.
    ///
    /// Both paths are given in the launcher's namespace; they are
    /// translated for the host when running under WSL.
    pub fn start(&self, monitor_path: &Path, project_path: &Path) -> StartOutcome {
        if !self.env.has_windows_host() {
            info!(
                environment = self.env.as_str(),
                "host bridge not applicable: no Windows host to bridge to"
            );
            return StartOutcome::NotApplicable {
                environment: self.env,
            };
        }

        let artifact = MonitorArtifact::new(monitor_path);
        if !artifact.exists() {
            warn!(path = %monitor_path.display(), "monitor artifact not found");
            return StartOutcome::Failed(StartFailure::ArtifactMissing {
                path: monitor_path.to_path_buf(),
            });
        }
        self.track_identity(artifact.identity());
        let launch = artifact.launch(project_path, self.env, &self.shells.powershell_program());
        let manual = launch.manual_cmd_line();

        if self.shells.is_empty() {
            warn!("no Windows shell reachable; skipping start strategies");
            return StartOutcome::Failed(StartFailure::InterpreterUnavailable { manual });
        }

        let running = self.count_or_zero(&launch.identity);
        if running > 0 {
            info!(instances = running, "monitor already running");
            return StartOutcome::AlreadyRunning { instances: running };
        }

        let mut attempts = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let kind = strategy.kind();
            debug!(strategy = kind.as_str(), program = %launch.host_program, "starting monitor");
            let report = strategy.start(&launch).map_err(|e| format!("{e:#}"));
            match &report {
                Ok(r) if r.exit_code.is_some_and(|c| c != 0) => {
                    debug!(strategy = kind.as_str(), code = ?r.exit_code, output = %r.output.trim(), "start request returned non-zero");
                }
                Ok(_) => {}
                Err(e) => warn!(strategy = kind.as_str(), "start attempt failed: {e}"),
            }
            if !self.settle.is_zero() {
                thread::sleep(self.settle);
            }
            let instances = self.count_or_zero(&launch.identity);
            attempts.push(Attempt {
                strategy: kind,
                report,
                instances,
            });
            if instances > 0 {
                info!(strategy = kind.as_str(), instances, "monitor started");
                return StartOutcome::Started {
                    via: kind,
                    instances,
                };
            }
            debug!(strategy = kind.as_str(), "no monitor process after start attempt");
        }

        warn!("monitor could not be verified after all start strategies");
        StartOutcome::Failed(StartFailure::Unverified { manual, attempts })
    }

    /// Terminate every known monitor. Errors are logged and recorded,
    /// never returned.
    pub fn stop(&self) -> StopReport {
        let mut report = StopReport::default();
        if !self.env.has_windows_host() {
            debug!(environment = self.env.as_str(), "no host monitors to stop");
            return report;
        }
        let mut handled: HashSet<u32> = HashSet::new();
        for identity in self.identities() {
            if !self.table.can_match(&identity) {
                debug!(monitor = %identity, "cannot enumerate this monitor here");
                continue;
            }
            let mut entry = FlavorStop::default();
            match self.table.find(&identity) {
                Ok(pids) => {
                    for pid in pids {
                        if !handled.insert(pid) {
                            continue;
                        }
                        entry.found += 1;
                        match self.table.terminate(pid) {
                            Ok(()) => entry.terminated += 1,
                            Err(e) => {
                                warn!(pid, monitor = %identity, "failed to terminate monitor: {e:#}");
                                entry.errors.push(format!("pid {pid}: {e:#}"));
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(monitor = %identity, "failed to enumerate monitors: {e:#}");
                    entry.errors.push(format!("{e:#}"));
                }
            }
            if entry.terminated > 0 {
                info!(monitor = %identity, count = entry.terminated, "stopped monitor(s)");
            }
            report.monitors.push((identity, entry));
        }
        report
    }

    /// Running instance counts per monitor identity.
    pub fn status(&self) -> Vec<(ProcessIdentity, Result<usize>)> {
        if !self.env.has_windows_host() {
            return Vec::new();
        }
        self.identities()
            .into_iter()
            .map(|identity| {
                let count = if self.table.can_match(&identity) {
                    self.table.count(&identity)
                } else {
                    Err(anyhow!("needs PowerShell to enumerate"))
                };
                (identity, count)
            })
            .collect()
    }

    fn count_or_zero(&self, identity: &ProcessIdentity) -> usize {
        match self.table.count(identity) {
            Ok(n) => n,
            Err(e) => {
                warn!(flavor = identity.flavor.as_str(), "process enumeration failed: {e:#}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct TableState {
        running: Cell<usize>,
        killed: RefCell<Vec<u32>>,
        fail_find: Cell<bool>,
        stem: RefCell<String>,
    }

    impl Default for TableState {
        fn default() -> Self {
            Self {
                running: Cell::new(0),
                killed: RefCell::new(Vec::new()),
                fail_find: Cell::new(false),
                stem: RefCell::new(NATIVE_MONITOR_NAME.to_string()),
            }
        }
    }

    struct FakeTable(Rc<TableState>);

    impl ProcessTable for FakeTable {
        fn find(&self, identity: &ProcessIdentity) -> Result<Vec<u32>> {
            if self.0.fail_find.get() {
                return Err(anyhow!("enumeration broke"));
            }
            if identity.flavor != MonitorFlavor::Native
                || identity.image_stem != *self.0.stem.borrow()
            {
                return Ok(Vec::new());
            }
            Ok((0..self.0.running.get() as u32).map(|i| 100 + i).collect())
        }

        fn terminate(&self, pid: u32) -> Result<()> {
            self.0.killed.borrow_mut().push(pid);
            Ok(())
        }
    }

    struct FakeStart {
        kind: StrategyKind,
        spawns: usize,
        calls: Rc<Cell<usize>>,
        table: Rc<TableState>,
    }

    impl DetachedStart for FakeStart {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn start(&self, _launch: &MonitorLaunch) -> Result<LaunchReport> {
            self.calls.set(self.calls.get() + 1);
            self.table.running.set(self.table.running.get() + self.spawns);
            Ok(LaunchReport {
                exit_code: Some(if self.spawns == 0 { 1 } else { 0 }),
                output: String::new(),
            })
        }
    }

    struct Fixture {
        table: Rc<TableState>,
        calls: Rc<Cell<usize>>,
        supervisor: MonitorSupervisor,
        artifact: tempfile::TempDir,
    }

    impl Fixture {
        fn monitor_path(&self) -> PathBuf {
            self.artifact.path().join("ti-host-monitor.exe")
        }
    }

    fn fixture(env: Environment, spawns_a: usize, spawns_b: usize, shells: HostShells) -> Fixture {
        let table = Rc::new(TableState::default());
        let calls = Rc::new(Cell::new(0));
        let strategies: Vec<Box<dyn DetachedStart>> = vec![
            Box::new(FakeStart {
                kind: StrategyKind::HostShell,
                spawns: spawns_a,
                calls: calls.clone(),
                table: table.clone(),
            }),
            Box::new(FakeStart {
                kind: StrategyKind::DirectSpawn,
                spawns: spawns_b,
                calls: calls.clone(),
                table: table.clone(),
            }),
        ];
        let artifact = tempfile::tempdir().expect("tmpdir");
        std::fs::write(artifact.path().join("ti-host-monitor.exe"), b"MZ").expect("write");
        let supervisor = MonitorSupervisor::new(
            env,
            shells,
            Box::new(FakeTable(table.clone())),
            strategies,
            Duration::ZERO,
        );
        Fixture {
            table,
            calls,
            supervisor,
            artifact,
        }
    }

    fn both_shells() -> HostShells {
        HostShells {
            powershell: Some(PathBuf::from("powershell.exe")),
            cmd: Some(PathBuf::from("cmd.exe")),
        }
    }

    #[test]
    fn test_native_start_is_noop() {
        let f = fixture(Environment::NativeMacos, 1, 1, HostShells::default());
        let out = f.supervisor.start(&f.monitor_path(), Path::new("/tmp/p"));
        assert_eq!(
            out,
            StartOutcome::NotApplicable {
                environment: Environment::NativeMacos
            }
        );
        assert!(out.is_ok());
        assert_eq!(f.calls.get(), 0);
    }

    #[test]
    fn test_falls_back_to_direct_spawn() {
        let f = fixture(Environment::WslBridge, 0, 1, both_shells());
        let out = f.supervisor.start(&f.monitor_path(), Path::new("/mnt/c/p"));
        assert_eq!(
            out,
            StartOutcome::Started {
                via: StrategyKind::DirectSpawn,
                instances: 1
            }
        );
        assert_eq!(f.calls.get(), 2);
    }

    #[test]
    fn test_first_strategy_success_skips_second() {
        let f = fixture(Environment::WindowsHost, 1, 1, both_shells());
        let out = f.supervisor.start(&f.monitor_path(), Path::new("C:\\p"));
        assert!(matches!(out, StartOutcome::Started { via: StrategyKind::HostShell, .. }));
        assert_eq!(f.calls.get(), 1);
    }

    #[test]
    fn test_already_running_is_not_restarted() {
        let f = fixture(Environment::WslBridge, 1, 1, both_shells());
        f.table.running.set(1);
        let out = f.supervisor.start(&f.monitor_path(), Path::new("/mnt/c/p"));
        assert_eq!(out, StartOutcome::AlreadyRunning { instances: 1 });
        assert_eq!(f.calls.get(), 0);
    }

    #[test]
    fn test_unverified_after_both_strategies() {
        let f = fixture(Environment::WslBridge, 0, 0, both_shells());
        match f.supervisor.start(&f.monitor_path(), Path::new("/mnt/c/p")) {
            StartOutcome::Failed(StartFailure::Unverified { manual, attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts.iter().all(|a| !a.verified()));
                assert!(manual.contains("--project-dir C:\\p"), "{manual}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_no_interpreter_fails_without_attempts() {
        let f = fixture(Environment::WslBridge, 1, 1, HostShells::default());
        let out = f.supervisor.start(&f.monitor_path(), Path::new("/mnt/c/p"));
        match &out {
            StartOutcome::Failed(fail @ StartFailure::InterpreterUnavailable { .. }) => {
                assert!(fail.manual_command().is_some());
                assert!(fail.to_string().contains("start the monitor manually"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.calls.get(), 0);
    }

    #[test]
    fn test_missing_artifact() {
        let f = fixture(Environment::WslBridge, 1, 1, both_shells());
        let missing = f.artifact.path().join("nope.exe");
        let out = f.supervisor.start(&missing, Path::new("/mnt/c/p"));
        assert_eq!(
            out,
            StartOutcome::Failed(StartFailure::ArtifactMissing { path: missing })
        );
    }

    #[test]
    fn test_stop_with_nothing_running() {
        let f = fixture(Environment::WslBridge, 0, 0, both_shells());
        let report = f.supervisor.stop();
        assert_eq!(report.terminated(), 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_stop_terminates_all_matches() {
        let f = fixture(Environment::WindowsHost, 0, 0, both_shells());
        f.table.running.set(2);
        let report = f.supervisor.stop();
        assert_eq!(report.terminated_for(MonitorFlavor::Native), 2);
        assert_eq!(*f.table.killed.borrow(), vec![100, 101]);
    }

    #[test]
    fn test_stop_swallows_enumeration_errors() {
        let f = fixture(Environment::WslBridge, 0, 0, both_shells());
        f.table.fail_find.set(true);
        let report = f.supervisor.stop();
        assert_eq!(report.terminated(), 0);
        assert!(report.has_errors());
    }

    #[test]
    fn test_stop_terminates_monitor_started_under_custom_name() {
        let f = fixture(Environment::WslBridge, 1, 0, both_shells());
        *f.table.stem.borrow_mut() = "ti-host-monitor-v2".to_string();
        let exe = f.artifact.path().join("ti-host-monitor-v2.exe");
        std::fs::write(&exe, b"MZ").expect("write");
        assert_eq!(
            f.supervisor.start(&exe, Path::new("/mnt/c/p")),
            StartOutcome::Started {
                via: StrategyKind::HostShell,
                instances: 1
            }
        );
        let status = f.supervisor.status();
        let custom = status
            .iter()
            .find(|(id, _)| id.image_stem == "ti-host-monitor-v2")
            .expect("custom identity listed");
        assert_eq!(custom.1.as_ref().ok(), Some(&1));

        let report = f.supervisor.stop();
        assert_eq!(report.terminated_for(MonitorFlavor::Native), 1);
        assert_eq!(*f.table.killed.borrow(), vec![100]);
    }

    #[test]
    fn test_tracked_path_is_stopped_and_listed_once() {
        let f = fixture(Environment::WindowsHost, 0, 0, both_shells());
        *f.table.stem.borrow_mut() = "bridge-mon".to_string();
        f.table.running.set(2);
        f.supervisor.track(Path::new("C:/tools/bridge-mon.exe"));
        f.supervisor.track(Path::new("C:/tools/bridge-mon.exe"));
        f.supervisor.track(Path::new("C:/tools/ti-host-monitor.exe"));
        assert_eq!(f.supervisor.identities().len(), 3);
        assert_eq!(f.supervisor.stop().terminated(), 2);
    }

    #[test]
    fn test_stop_on_native_is_empty() {
        let f = fixture(Environment::NativeLinux, 0, 0, HostShells::default());
        f.table.running.set(3);
        assert_eq!(f.supervisor.stop(), StopReport::default());
        assert!(f.table.killed.borrow().is_empty());
    }
}
