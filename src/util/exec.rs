use std::ffi::{OsStr, OsString};
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use wait_timeout::ChildExt;

/// Runs short-lived host commands (shell launch requests, process queries)
/// with a hard timeout and captured output.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        cmd.stdin(Stdio::null());
        if request.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", request.preview()))?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let status = if timeout.is_zero() {
            child.wait().context("failed to wait for process")?
        } else {
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(anyhow!(
                        "command {} timed out after {:?}",
                        request.preview(),
                        timeout
                    ));
                }
            }
        };

        let duration = started.elapsed();
        let stdout = read_stream(stdout_pipe.as_mut())?;
        let stderr = read_stream(stderr_pipe.as_mut())?;

        Ok(ExecOutput {
            status,
            duration,
            stdout,
            stderr,
        })
    }
}

fn read_stream(stream: Option<&mut impl io::Read>) -> Result<String> {
    let mut buf = Vec::new();
    if let Some(reader) = stream {
        reader
            .read_to_end(&mut buf)
            .context("failed to read process output")?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
    capture_output: bool,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            capture_output: true,
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Shell-escaped rendering for logs and manual-recovery hints.
    pub fn preview(&self) -> String {
        let mut words = vec![self.program.to_string_lossy().into_owned()];
        words.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        crate::util::shell_join(&words)
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Trimmed stdout followed by trimmed stderr, for diagnostics.
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (true, true) => String::new(),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{out}\n{err}"),
        }
    }
}

/// Start `program` so that it outlives this process and its session.
///
/// On Unix the child becomes a session leader (`setsid`), which also keeps
/// WSL interop launches alive after the launching shell exits. On Windows it
/// is created detached in its own process group. Returns the child's PID; the
/// child is reaped by a background thread if it exits while we still run.
pub fn spawn_detached<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> io::Result<u32> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure runs between fork and exec and only calls setsid,
        // which is async-signal-safe.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(io::Error::from)
            });
        }
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id();
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(pid)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_status() {
        let out = ExecService::default()
            .run(ExecRequest::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .expect("run sh");
        assert_eq!(out.code(), Some(3));
        assert!(!out.success());
        assert_eq!(out.combined(), "hello\noops");
    }

    #[test]
    fn test_timeout_kills_child() {
        let err = ExecService::default()
            .run(
                ExecRequest::new("sh")
                    .args(["-c", "sleep 5"])
                    .timeout(Duration::from_millis(100)),
            )
            .expect_err("should time out");
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = ExecService::default()
            .run(ExecRequest::new("definitely-not-a-real-binary-ti"))
            .expect_err("spawn should fail");
        assert!(err.to_string().contains("failed to spawn"), "{err}");
    }

    #[test]
    fn test_spawn_detached_returns_pid() {
        let pid = spawn_detached(OsStr::new("sh"), &["-c", "exit 0"]).expect("spawn");
        assert!(pid > 0);
        let err = spawn_detached(OsStr::new("definitely-not-a-real-binary-ti"), &[] as &[&str])
            .expect_err("missing program");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_preview_escapes_arguments() {
        let req = ExecRequest::new("powershell.exe").args(["-Command", "Start-Process 'x'"]);
        assert_eq!(req.preview(), "powershell.exe -Command 'Start-Process '\"'\"'x'\"'\"''");
    }
}
