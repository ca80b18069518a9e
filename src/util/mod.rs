#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell/PowerShell/cmd quoting and the timed command runner.

pub mod exec;

pub use exec::{spawn_detached, ExecOutput, ExecRequest, ExecService};

/// Reject strings containing newline, carriage return, or NUL before embedding into a shell command.
///
/// Keep error text stable (tests/UX depend on it).
pub fn reject_newlines(s: &str, what: &str) -> Result<(), String> {
    if s.contains('\n') || s.contains('\r') || s.contains('\0') {
        Err(format!("refusing to execute {what}: contains newline"))
    } else {
        Ok(())
    }
}

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}

/// Single-quoted PowerShell literal; embedded quotes are doubled.
pub fn ps_quote(s: &str) -> String {
    let esc = s.replace('\'', "''");
    format!("'{}'", esc)
}

/// Comma-joined PowerShell array of quoted literals (for -ArgumentList).
pub fn ps_array(items: &[String]) -> String {
    items
        .iter()
        .map(|s| ps_quote(s))
        .collect::<Vec<_>>()
        .join(",")
}

/// Double-quote an argument for cmd.exe when it contains spaces or specials.
pub fn cmd_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:\\".contains(c))
    {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('"', "\"\""))
    }
}
