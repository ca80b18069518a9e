use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ti_host_bridge::{
    DetachedStart, Environment, HostShells, LaunchReport, MonitorFlavor, MonitorLaunch,
    MonitorSupervisor, ProcessIdentity, ProcessTable, StartFailure, StartOutcome, StrategyKind,
};

#[derive(Default)]
struct Host {
    running: RefCell<Vec<(MonitorFlavor, u32)>>,
    launches: RefCell<Vec<(StrategyKind, MonitorLaunch)>>,
}

struct Table(Rc<Host>);

impl ProcessTable for Table {
    fn find(&self, identity: &ProcessIdentity) -> Result<Vec<u32>> {
        Ok(self
            .0
            .running
            .borrow()
            .iter()
            .filter(|(f, _)| *f == identity.flavor)
            .map(|(_, p)| *p)
            .collect())
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        if pid == 666 {
            return Err(anyhow!("access denied"));
        }
        self.0.running.borrow_mut().retain(|(_, p)| *p != pid);
        Ok(())
    }
}

struct Recorder {
    kind: StrategyKind,
    host: Rc<Host>,
    starts: bool,
}

impl DetachedStart for Recorder {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn start(&self, launch: &MonitorLaunch) -> Result<LaunchReport> {
        self.host
            .launches
            .borrow_mut()
            .push((self.kind, launch.clone()));
        if self.starts {
            self.host
                .running
                .borrow_mut()
                .push((launch.identity.flavor, 4242));
        }
        Ok(LaunchReport::default())
    }
}

fn supervisor(env: Environment, host: &Rc<Host>, a_starts: bool) -> MonitorSupervisor {
    MonitorSupervisor::new(
        env,
        HostShells {
            powershell: Some(PathBuf::from("powershell.exe")),
            cmd: None,
        },
        Box::new(Table(host.clone())),
        vec![
            Box::new(Recorder {
                kind: StrategyKind::HostShell,
                host: host.clone(),
                starts: a_starts,
            }),
            Box::new(Recorder {
                kind: StrategyKind::DirectSpawn,
                host: host.clone(),
                starts: true,
            }),
        ],
        Duration::ZERO,
    )
}

#[test]
fn test_script_monitor_launch_is_translated_for_the_host() {
    let td = tempfile::tempdir().expect("tmpdir");
    let script = td.path().join("browser_monitor.ps1");
    std::fs::write(&script, "# monitor").unwrap();
    let host = Rc::new(Host::default());
    let sup = supervisor(Environment::WslBridge, &host, false);

    let out = sup.start(&script, Path::new("/mnt/c/Users/alex/study"));
    assert_eq!(
        out,
        StartOutcome::Started {
            via: StrategyKind::DirectSpawn,
            instances: 1
        }
    );
    let launches = host.launches.borrow();
    assert_eq!(launches.len(), 2);
    let (_, launch) = &launches[1];
    assert_eq!(launch.local_program, "powershell.exe");
    assert!(launch.args.iter().any(|a| a == "C:\\Users\\alex\\study"));
    assert!(launch.args.iter().any(|a| a == "-File"));
}

#[test]
fn test_second_start_reports_already_running() {
    let td = tempfile::tempdir().expect("tmpdir");
    let exe = td.path().join("ti-host-monitor.exe");
    std::fs::write(&exe, b"MZ").unwrap();
    let host = Rc::new(Host::default());
    let sup = supervisor(Environment::WindowsHost, &host, true);

    assert!(matches!(
        sup.start(&exe, Path::new("C:\\study")),
        StartOutcome::Started { via: StrategyKind::HostShell, .. }
    ));
    assert_eq!(
        sup.start(&exe, Path::new("C:\\study")),
        StartOutcome::AlreadyRunning { instances: 1 }
    );
    assert_eq!(host.launches.borrow().len(), 1);
}

#[test]
fn test_stop_counts_per_flavor_and_continues_past_errors() {
    let host = Rc::new(Host::default());
    host.running.borrow_mut().extend([
        (MonitorFlavor::Native, 10),
        (MonitorFlavor::Native, 666),
        (MonitorFlavor::PowerShell, 20),
    ]);
    let sup = supervisor(Environment::WslBridge, &host, false);
    let report = sup.stop();
    assert_eq!(report.terminated_for(MonitorFlavor::Native), 1);
    assert_eq!(report.terminated_for(MonitorFlavor::PowerShell), 1);
    assert_eq!(report.terminated(), 2);
    assert!(report.has_errors());
    assert_eq!(*host.running.borrow(), vec![(MonitorFlavor::Native, 666)]);
}

#[test]
fn test_failure_message_carries_manual_command() {
    let td = tempfile::tempdir().expect("tmpdir");
    let exe = td.path().join("ti-host-monitor.exe");
    std::fs::write(&exe, b"MZ").unwrap();
    let host = Rc::new(Host::default());
    let sup = MonitorSupervisor::new(
        Environment::WslBridge,
        HostShells::default(),
        Box::new(Table(host.clone())),
        Vec::new(),
        Duration::ZERO,
    );
    match sup.start(&exe, Path::new("/mnt/e/work")) {
        StartOutcome::Failed(f @ StartFailure::InterpreterUnavailable { .. }) => {
            let text = f.to_string();
            assert!(text.contains("--project-dir E:\\work"), "{text}");
        }
        other => panic!("unexpected {other:?}"),
    }
}
