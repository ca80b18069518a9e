use std::fmt;
use std::path::{Path, PathBuf};

use crate::environment::Environment;
use crate::paths::to_windows_path;
use crate::util::{cmd_quote, ps_array, ps_quote};

/// Executable name of the native monitor (without `.exe`).
pub const NATIVE_MONITOR_NAME: &str = "ti-host-monitor";
/// File name of the legacy PowerShell monitor script.
pub const POWERSHELL_MONITOR_SCRIPT: &str = "browser_monitor.ps1";

/// The kinds of monitor process the supervisor knows how to find.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MonitorFlavor {
    /// The `ti-host-monitor` executable.
    Native,
    /// A PowerShell-hosted monitor script.
    PowerShell,
}

impl MonitorFlavor {
    pub const ALL: [MonitorFlavor; 2] = [MonitorFlavor::Native, MonitorFlavor::PowerShell];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorFlavor::Native => "native",
            MonitorFlavor::PowerShell => "powershell",
        }
    }

    /// Identity of monitors deployed under their default names.
    pub fn default_identity(&self) -> ProcessIdentity {
        match self {
            MonitorFlavor::Native => ProcessIdentity::native(NATIVE_MONITOR_NAME),
            MonitorFlavor::PowerShell => ProcessIdentity::script(POWERSHELL_MONITOR_SCRIPT),
        }
    }
}

impl fmt::Display for MonitorFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a monitor shows up in the host process list.
///
/// Native monitors are matched by executable name. Script monitors run
/// inside a PowerShell host and are matched by their command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub flavor: MonitorFlavor,
    /// Executable stem, e.g. `ti-host-monitor` (no `.exe`).
    pub image_stem: String,
    /// Substring the command line must contain, for script monitors.
    pub command_marker: Option<String>,
}

impl ProcessIdentity {
    pub fn native(stem: &str) -> Self {
        Self {
            flavor: MonitorFlavor::Native,
            image_stem: stem.to_string(),
            command_marker: None,
        }
    }

    pub fn script(script_file: &str) -> Self {
        Self {
            flavor: MonitorFlavor::PowerShell,
            image_stem: "powershell".to_string(),
            command_marker: Some(script_file.to_string()),
        }
    }

    /// Windows image names this identity may run under.
    pub fn windows_images(&self) -> Vec<String> {
        match self.flavor {
            MonitorFlavor::Native => vec![format!("{}.exe", self.image_stem)],
            MonitorFlavor::PowerShell => {
                vec!["powershell.exe".to_string(), "pwsh.exe".to_string()]
            }
        }
    }
}

/// Flavor name for default identities, else flavor plus the matched name.
impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == self.flavor.default_identity() {
            return write!(f, "{}", self.flavor);
        }
        let name = self.command_marker.as_deref().unwrap_or(&self.image_stem);
        write!(f, "{} ({name})", self.flavor)
    }
}

/// A monitor artifact on disk, as seen from the launcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorArtifact {
    path: PathBuf,
    flavor: MonitorFlavor,
}

impl MonitorArtifact {
    /// `.ps1` files are PowerShell monitors; anything else is an executable.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_script = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("ps1"));
        let flavor = if is_script {
            MonitorFlavor::PowerShell
        } else {
            MonitorFlavor::Native
        };
        Self { path, flavor }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flavor(&self) -> MonitorFlavor {
        self.flavor
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Identity derived from the artifact's own file name.
    pub fn identity(&self) -> ProcessIdentity {
        let file = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.flavor {
            MonitorFlavor::PowerShell => ProcessIdentity::script(&file),
            MonitorFlavor::Native => {
                let stem = file
                    .strip_suffix(".exe")
                    .or_else(|| file.strip_suffix(".EXE"))
                    .unwrap_or(&file);
                ProcessIdentity::native(stem)
            }
        }
    }

    /// Build the launch description for `project_dir` in `env`.
    pub fn launch(&self, project_dir: &Path, env: Environment, powershell: &str) -> MonitorLaunch {
        let host_path = |p: &Path| {
            let s = p.display().to_string();
            if env.needs_path_translation() {
                to_windows_path(&s)
            } else {
                s
            }
        };
        let project_host = host_path(project_dir);
        let artifact_host = host_path(&self.path);
        match self.flavor {
            MonitorFlavor::Native => MonitorLaunch {
                host_program: artifact_host,
                local_program: self.path.display().to_string(),
                args: vec!["--project-dir".to_string(), project_host],
                identity: self.identity(),
            },
            MonitorFlavor::PowerShell => MonitorLaunch {
                host_program: powershell.to_string(),
                local_program: powershell.to_string(),
                args: vec![
                    "-NoProfile".to_string(),
                    "-ExecutionPolicy".to_string(),
                    "Bypass".to_string(),
                    "-WindowStyle".to_string(),
                    "Hidden".to_string(),
                    "-File".to_string(),
                    artifact_host,
                    "-ProjectDir".to_string(),
                    project_host,
                ],
                identity: self.identity(),
            },
        }
    }
}

/// Everything a start strategy needs to launch one monitor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorLaunch {
    /// Program path in the host's (Windows) namespace.
    pub host_program: String,
    /// Program path as the launcher can execute it directly.
    pub local_program: String,
    /// Arguments, already in host form.
    pub args: Vec<String>,
    pub identity: ProcessIdentity,
}

impl MonitorLaunch {
    /// Command an operator can paste into a Windows Command Prompt.
    pub fn manual_cmd_line(&self) -> String {
        let mut words = vec![cmd_quote(&self.host_program)];
        words.extend(self.args.iter().map(|a| cmd_quote(a)));
        words.join(" ")
    }

    /// `Start-Process` line that starts the monitor detached from PowerShell.
    pub fn start_process_script(&self) -> String {
        format!(
            "Start-Process -FilePath {} -ArgumentList {} -WindowStyle Hidden",
            ps_quote(&self.host_program),
            ps_array(&self.args)
        )
    }
}
