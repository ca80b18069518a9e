use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::debug;

use super::artifact::ProcessIdentity;
use crate::util::{ps_quote, ExecRequest, ExecService};

/// Enumerate and terminate monitor processes on the host.
pub trait ProcessTable {
    /// PIDs of running processes matching `identity`, excluding the caller.
    fn find(&self, identity: &ProcessIdentity) -> Result<Vec<u32>>;

    /// Forcefully end `pid`. A process that is already gone is not an error.
    fn terminate(&self, pid: u32) -> Result<()>;

    fn count(&self, identity: &ProcessIdentity) -> Result<usize> {
        Ok(self.find(identity)?.len())
    }

    /// Whether `find` can match this identity at all.
    fn can_match(&self, _identity: &ProcessIdentity) -> bool {
        true
    }
}

impl<T: ProcessTable + ?Sized> ProcessTable for &T {
    fn find(&self, identity: &ProcessIdentity) -> Result<Vec<u32>> {
        (**self).find(identity)
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        (**self).terminate(pid)
    }

    fn can_match(&self, identity: &ProcessIdentity) -> bool {
        (**self).can_match(identity)
    }
}

/// The Windows process list, reached natively or through WSL interop.
///
/// With PowerShell available, `Get-CimInstance Win32_Process` is queried so
/// script monitors can be matched by command line. Without it, `tasklist`
/// covers image-name matches only.
#[derive(Debug, Clone)]
pub struct WindowsProcessTable {
    powershell: Option<PathBuf>,
    exec: ExecService,
}

impl WindowsProcessTable {
    pub fn new(powershell: Option<PathBuf>, exec: ExecService) -> Self {
        Self { powershell, exec }
    }

    fn find_cim(&self, powershell: &Path, identity: &ProcessIdentity) -> Result<Vec<u32>> {
        let script = cim_query(identity);
        let out = self.exec.run(
            ExecRequest::new(powershell)
                .args(["-NoProfile", "-NonInteractive", "-Command"])
                .arg(&script),
        )?;
        if !out.success() {
            bail!("process query failed: {}", out.combined());
        }
        Ok(parse_pid_lines(&out.stdout))
    }

    fn find_tasklist(&self, identity: &ProcessIdentity) -> Result<Vec<u32>> {
        if identity.command_marker.is_some() {
            bail!("matching {} monitors needs PowerShell", identity.flavor);
        }
        let mut pids = Vec::new();
        for image in identity.windows_images() {
            let out = self.exec.run(
                ExecRequest::new("tasklist.exe")
                    .arg("/FI")
                    .arg(format!("IMAGENAME eq {image}"))
                    .args(["/FO", "CSV", "/NH"]),
            )?;
            if !out.success() {
                bail!("tasklist failed: {}", out.combined());
            }
            pids.extend(parse_tasklist_csv(&out.stdout, &image));
        }
        Ok(pids)
    }
}

impl ProcessTable for WindowsProcessTable {
    fn find(&self, identity: &ProcessIdentity) -> Result<Vec<u32>> {
        match &self.powershell {
            Some(ps) => self.find_cim(ps, identity),
            None => self.find_tasklist(identity),
        }
    }

    fn can_match(&self, identity: &ProcessIdentity) -> bool {
        self.powershell.is_some() || identity.command_marker.is_none()
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        let out = self.exec.run(
            ExecRequest::new("taskkill.exe")
                .args(["/F", "/PID"])
                .arg(pid.to_string()),
        )?;
        match out.code() {
            Some(0) => Ok(()),
            // "process not found"
            Some(128) => {
                debug!(pid, "process already exited");
                Ok(())
            }
            _ => bail!("taskkill /PID {pid} failed: {}", out.combined()),
        }
    }
}

/// PowerShell pipeline printing matching PIDs one per line.
///
/// Only single-quoted literals are used so the script survives being passed
/// as one `-Command` argument.
pub fn cim_query(identity: &ProcessIdentity) -> String {
    let images = identity
        .windows_images()
        .iter()
        .map(|i| format!("$_.Name -eq {}", ps_quote(i)))
        .collect::<Vec<_>>()
        .join(" -or ");
    let mut cond = format!("({images})");
    if let Some(marker) = &identity.command_marker {
        let pattern = format!("*{}*", wildcard_escape(marker));
        cond.push_str(&format!(" -and $_.CommandLine -like {}", ps_quote(&pattern)));
    }
    format!(
        "Get-CimInstance Win32_Process | Where-Object {{ {cond} -and $_.ProcessId -ne $PID }} | ForEach-Object {{ $_.ProcessId }}"
    )
}

// PowerShell -like treats [ ] * ? as wildcards; backtick escapes them.
fn wildcard_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '[' | ']' | '*' | '?' | '`') {
            out.push('`');
        }
        out.push(c);
    }
    out
}

fn parse_pid_lines(text: &str) -> Vec<u32> {
    text.lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .collect()
}

/// Parse `tasklist /FO CSV /NH` rows whose image name equals `image`.
///
/// When nothing matches tasklist prints an `INFO:` line instead of rows.
pub fn parse_tasklist_csv(text: &str, image: &str) -> Vec<u32> {
    text.lines()
        .filter_map(|line| {
            let mut cols = line.split("\",\"");
            let name = cols.next()?.trim().trim_start_matches('"');
            let pid = cols.next()?.trim_end_matches('"');
            if !name.eq_ignore_ascii_case(image) {
                return None;
            }
            pid.parse::<u32>().ok()
        })
        .collect()
}
