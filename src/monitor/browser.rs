use std::ffi::OsStr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;
use which::which;

use crate::util::{spawn_detached, ExecRequest, ExecService};

/// Opens a URL on the host.
pub trait BrowserLauncher {
    fn open(&self, url: &Url) -> Result<()>;
}

impl<T: BrowserLauncher + ?Sized> BrowserLauncher for &T {
    fn open(&self, url: &Url) -> Result<()> {
        (**self).open(url)
    }
}

/// Launcher backed by the host's browsers.
///
/// Order: an explicit command when configured; otherwise, in app mode, a
/// Chromium-family browser with `--app=<url>` for a dedicated window;
/// finally the platform URL opener.
#[derive(Debug, Clone)]
pub struct SystemBrowser {
    app_mode: bool,
    command: Option<Vec<String>>,
    exec: ExecService,
}

impl SystemBrowser {
    pub fn new(app_mode: bool, command: Option<Vec<String>>, exec: ExecService) -> Self {
        Self {
            app_mode,
            command,
            exec,
        }
    }

    fn open_with_command(&self, argv: &[String], url: &Url) -> Result<()> {
        let args = command_args(argv, url.as_str());
        let program = &argv[0];
        spawn_detached(OsStr::new(program), &args)
            .with_context(|| format!("failed to start configured browser '{program}'"))?;
        Ok(())
    }

    fn open_app_window(&self, url: &Url) -> Option<PathBuf> {
        for candidate in app_browser_candidates() {
            let app = format!("--app={url}");
            let args = [app.as_str(), "--new-window"];
            match spawn_detached(candidate.as_os_str(), &args) {
                Ok(pid) => {
                    tracing::debug!(browser = %candidate.display(), pid, "opened app window");
                    return Some(candidate);
                }
                Err(e) => {
                    tracing::debug!(browser = %candidate.display(), "cannot start browser: {e}");
                }
            }
        }
        None
    }

    fn open_default(&self, url: &Url) -> Result<()> {
        let request = default_opener_request(url);
        let out = self.exec.run(request.clone())?;
        if !out.success() {
            bail!(
                "{} exited with {}: {}",
                request.preview(),
                out.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".into()),
                out.combined()
            );
        }
        Ok(())
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> Result<()> {
        if let Some(argv) = &self.command {
            return self.open_with_command(argv, url);
        }
        if self.app_mode && self.open_app_window(url).is_some() {
            return Ok(());
        }
        self.open_default(url)
    }
}

/// Substitute `{url}` in a configured argv, or append the URL when absent.
fn command_args(argv: &[String], url: &str) -> Vec<String> {
    let mut args: Vec<String> = argv
        .iter()
        .skip(1)
        .map(|a| a.replace("{url}", url))
        .collect();
    if !argv.iter().skip(1).any(|a| a.contains("{url}")) {
        args.push(url.to_string());
    }
    args
}

fn default_opener_request(url: &Url) -> ExecRequest {
    if cfg!(windows) {
        // rundll32 avoids cmd.exe re-parsing '&' in query strings.
        ExecRequest::new("rundll32.exe")
            .arg("url.dll,FileProtocolHandler")
            .arg(url.as_str())
    } else if cfg!(target_os = "macos") {
        ExecRequest::new("open").arg(url.as_str())
    } else {
        ExecRequest::new("xdg-open").arg(url.as_str())
    }
}

fn app_browser_candidates() -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    let on_path: &[&str] = if cfg!(windows) {
        &["chrome.exe", "msedge.exe"]
    } else if cfg!(target_os = "macos") {
        &[]
    } else {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
        ]
    };
    for name in on_path {
        if let Ok(p) = which(name) {
            out.push(p);
        }
    }
    if cfg!(windows) {
        let roots = ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"];
        let tails = [
            "Google\\Chrome\\Application\\chrome.exe",
            "Microsoft\\Edge\\Application\\msedge.exe",
        ];
        for root in roots {
            let Ok(base) = std::env::var(root) else {
                continue;
            };
            for tail in tails {
                out.push(PathBuf::from(&base).join(tail));
            }
        }
    } else if cfg!(target_os = "macos") {
        for app in [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ] {
            out.push(PathBuf::from(app));
        }
    }
    out.retain(|p| p.is_file());
    out.dedup();
    out
}
