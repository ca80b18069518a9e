use std::env;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, ExitCode, ExitStatus};
#[cfg(unix)]
use std::sync::atomic::{AtomicI32, Ordering};
#[cfg(unix)]
use std::thread;
#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal as NixSignal};
#[cfg(unix)]
use nix::unistd::Pid;

use clap::Parser;
use ti_host_bridge::{
    color_enabled_stderr, exit_code_for_bridge_error, exit_code_for_io_error, init_tracing,
    log_error_stderr, log_info_stderr, log_warn_stderr, set_color_mode, to_windows_path,
    to_wsl_path, BridgeConfig, BridgeError, Environment, MonitorSupervisor, Signal, SignalSlot,
    StartFailure, StartOutcome, StopReport,
};

mod cli;

use cli::{Cli, Command};

fn fail(use_err: bool, e: &BridgeError) -> ExitCode {
    log_error_stderr(use_err, &format!("ti-bridge: {e}"));
    ExitCode::from(exit_code_for_bridge_error(e))
}

/// Absolute, existing project directory.
fn usable_project_dir(p: &Path) -> Result<PathBuf, BridgeError> {
    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        env::current_dir()?.join(p)
    };
    if abs.is_dir() {
        Ok(abs)
    } else {
        Err(BridgeError::ProjectDirUnusable(Some(abs)))
    }
}

fn report_start(outcome: &StartOutcome, use_err: bool, verbose: bool) {
    match outcome {
        StartOutcome::NotApplicable { environment } => log_info_stderr(
            use_err,
            &format!("ti-bridge: host browser bridge not needed ({environment})"),
        ),
        StartOutcome::AlreadyRunning { instances } => log_info_stderr(
            use_err,
            &format!("ti-bridge: host monitor already running ({instances} instance(s))"),
        ),
        StartOutcome::Started { via, instances } => log_info_stderr(
            use_err,
            &format!("ti-bridge: host monitor started via {via} ({instances} instance(s))"),
        ),
        StartOutcome::Failed(failure) => {
            log_warn_stderr(
                use_err,
                &format!("ti-bridge: browser bridge unavailable: {failure}"),
            );
            if let StartFailure::Unverified { attempts, .. } = failure {
                if verbose {
                    for a in attempts {
                        let detail = match &a.report {
                            Ok(r) => format!(
                                "exit {} {}",
                                r.exit_code
                                    .map(|c| c.to_string())
                                    .unwrap_or_else(|| "-".to_string()),
                                r.output.trim()
                            ),
                            Err(e) => e.clone(),
                        };
                        eprintln!("  {}: {}", a.strategy, detail.trim());
                    }
                }
            }
        }
    }
}

fn report_stop(report: &StopReport, use_err: bool) {
    let n = report.terminated();
    if n == 0 {
        log_info_stderr(use_err, "ti-bridge: no host monitors to stop");
    } else {
        log_info_stderr(use_err, &format!("ti-bridge: stopped {n} host monitor(s)"));
    }
    for (identity, entry) in &report.monitors {
        for e in &entry.errors {
            log_warn_stderr(use_err, &format!("ti-bridge: {identity} monitor cleanup: {e}"));
        }
    }
}

#[cfg(unix)]
static TEARDOWN_SIGNAL: AtomicI32 = AtomicI32::new(0);

#[cfg(unix)]
extern "C" fn record_teardown_signal(sig: i32) {
    TEARDOWN_SIGNAL.store(sig, Ordering::SeqCst);
}

/// Keep `run` alive through SIGINT/SIGTERM/SIGHUP so monitors still get
/// stopped. Handlers reset to default in the exec'd child.
#[cfg(unix)]
fn install_teardown_handlers() {
    let act = SigAction::new(
        SigHandler::Handler(record_teardown_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores into an atomic.
    unsafe {
        let _ = signal::sigaction(NixSignal::SIGINT, &act);
        let _ = signal::sigaction(NixSignal::SIGTERM, &act);
        let _ = signal::sigaction(NixSignal::SIGHUP, &act);
    }
}

/// Exit code for a finished child; signals map to 128+n, out-of-range codes to 1.
fn child_exit_code(status: ExitStatus) -> u8 {
    if let Some(c) = status.code() {
        return u8::try_from(c).unwrap_or(1);
    }
    #[cfg(unix)]
    {
        if let Some(sig) = status.signal() {
            return u8::try_from(128 + sig).unwrap_or(1);
        }
    }
    1
}

#[cfg(unix)]
fn wait_wrapped(child: &mut Child, use_err: bool) -> std::io::Result<ExitStatus> {
    let mut forwarded = false;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        let sig = TEARDOWN_SIGNAL.load(Ordering::SeqCst);
        if sig != 0 && !forwarded {
            forwarded = true;
            // SIGINT from a terminal already reaches the whole foreground group.
            if let Ok(s) = NixSignal::try_from(sig) {
                log_info_stderr(
                    use_err,
                    &format!("ti-bridge: received {s}; waiting for the command to exit"),
                );
                if s != NixSignal::SIGINT {
                    let _ = signal::kill(Pid::from_raw(child.id() as i32), s);
                }
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(not(unix))]
fn wait_wrapped(child: &mut Child, _use_err: bool) -> std::io::Result<ExitStatus> {
    child.wait()
}

fn run_wrapped(argv: &[String], use_err: bool) -> u8 {
    let Some((program, args)) = argv.split_first() else {
        return 1;
    };
    #[cfg(unix)]
    install_teardown_handlers();
    let mut child = match ProcessCommand::new(program).args(args).spawn() {
        Ok(c) => c,
        Err(e) => {
            log_error_stderr(use_err, &format!("ti-bridge: cannot run {program}: {e}"));
            return exit_code_for_io_error(&e);
        }
    };
    match wait_wrapped(&mut child, use_err) {
        Ok(status) => child_exit_code(status),
        Err(e) => {
            log_error_stderr(use_err, &format!("ti-bridge: failed waiting for {program}: {e}"));
            1
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        set_color_mode(mode);
    }
    init_tracing("error", cli.verbose);
    let use_err = color_enabled_stderr();

    // Commands that need neither configuration nor the host.
    match &cli.command {
        Command::Env => {
            println!("{}", Environment::current());
            return ExitCode::from(0);
        }
        Command::Translate { path, reverse } => {
            let out = if *reverse {
                to_wsl_path(path)
            } else {
                to_windows_path(path)
            };
            println!("{out}");
            return ExitCode::from(0);
        }
        _ => {}
    }

    let cfg = match BridgeConfig::load() {
        Ok(c) => c,
        Err(e) => return fail(use_err, &e),
    };

    match cli.command {
        Command::Start {
            monitor,
            project_dir,
            strict,
        } => {
            let project = match usable_project_dir(&project_dir) {
                Ok(p) => p,
                Err(e) => return fail(use_err, &e),
            };
            let supervisor = MonitorSupervisor::for_host(Environment::current(), &cfg);
            let outcome = supervisor.start(&monitor, &project);
            report_start(&outcome, use_err, cli.verbose);
            if strict && !outcome.is_ok() {
                ExitCode::from(1)
            } else {
                ExitCode::from(0)
            }
        }
        Command::Stop { monitor } => {
            let supervisor = MonitorSupervisor::for_host(Environment::current(), &cfg);
            for m in &monitor {
                supervisor.track(m);
            }
            report_stop(&supervisor.stop(), use_err);
            ExitCode::from(0)
        }
        Command::Status { monitor } => {
            let environment = Environment::current();
            let supervisor = MonitorSupervisor::for_host(environment, &cfg);
            for m in &monitor {
                supervisor.track(m);
            }
            let status = supervisor.status();
            if status.is_empty() {
                println!("not applicable ({environment})");
            }
            for (identity, count) in status {
                match count {
                    Ok(n) => println!("{identity}: {n}"),
                    Err(e) => println!("{identity}: unknown ({e:#})"),
                }
            }
            ExitCode::from(0)
        }
        Command::Trigger { url, project_dir } => {
            let dir = project_dir
                .or_else(|| {
                    env::var("TI_BRIDGE_PROJECT_DIR")
                        .ok()
                        .filter(|v| !v.trim().is_empty())
                        .map(PathBuf::from)
                })
                .unwrap_or_else(|| PathBuf::from("."));
            let project = match usable_project_dir(&dir) {
                Ok(p) => p,
                Err(e) => return fail(use_err, &e),
            };
            let signal = match Signal::launch(&url) {
                Ok(s) => s,
                Err(m) => return fail(use_err, &BridgeError::Message(format!("refusing trigger: {m}"))),
            };
            let slot = SignalSlot::in_metadata_dir(&cfg.metadata_dir_for(&project));
            if let Err(e) = slot.post(&signal) {
                return fail(use_err, &BridgeError::Message(format!("{e:#}")));
            }
            if cli.verbose {
                log_info_stderr(
                    use_err,
                    &format!("ti-bridge: posted {} to {}", signal.target_url, slot.path().display()),
                );
            }
            ExitCode::from(0)
        }
        Command::Run {
            monitor,
            project_dir,
            command,
        } => {
            let project = match usable_project_dir(&project_dir) {
                Ok(p) => p,
                Err(e) => return fail(use_err, &e),
            };
            let supervisor = MonitorSupervisor::for_host(Environment::current(), &cfg);
            let outcome = supervisor.start(&monitor, &project);
            report_start(&outcome, use_err, cli.verbose);
            let code = run_wrapped(&command, use_err);
            report_stop(&supervisor.stop(), use_err);
            ExitCode::from(code)
        }
        Command::Doctor => {
            ti_host_bridge::doctor::run_doctor(cli.verbose, &cfg);
            ExitCode::from(0)
        }
        Command::Env | Command::Translate { .. } => ExitCode::from(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_child_exit_code_maps_signals() {
        assert_eq!(child_exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(child_exit_code(ExitStatus::from_raw(2)), 130);
        assert_eq!(child_exit_code(ExitStatus::from_raw(15)), 143);
    }

    #[cfg(windows)]
    #[test]
    fn test_child_exit_code_out_of_range_is_failure() {
        use std::os::windows::process::ExitStatusExt;
        assert_eq!(child_exit_code(ExitStatus::from_raw(256)), 1);
        assert_eq!(child_exit_code(ExitStatus::from_raw(0xC000_013A)), 1);
        assert_eq!(child_exit_code(ExitStatus::from_raw(2)), 2);
    }
}
