//! Execution-context classification.
//!
//! The launcher decides once per invocation whether it runs on native Linux,
//! native macOS, a Windows host with a shell scripting host, or inside WSL.
//! Every downstream branch (path translation, monitor start strategy) takes
//! the resulting [`Environment`] explicitly.

use std::fmt;
use std::fs;

use once_cell::sync::OnceCell;
use which::which;

/// Where the launcher runs relative to the Windows host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Environment {
    NativeLinux,
    NativeMacos,
    /// Native Windows with a command shell (PowerShell/cmd) reachable.
    WindowsHost,
    /// Linux userland on a Windows kernel; host tooling is reached via interop.
    WslBridge,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::NativeLinux => "native-linux",
            Environment::NativeMacos => "native-macos",
            Environment::WindowsHost => "windows-host",
            Environment::WslBridge => "wsl-bridge",
        }
    }

    /// True when a Windows host exists on the other side of the boundary.
    pub fn has_windows_host(&self) -> bool {
        matches!(self, Environment::WindowsHost | Environment::WslBridge)
    }

    /// Paths must go through the translator before reaching host tooling.
    pub fn needs_path_translation(&self) -> bool {
        matches!(self, Environment::WslBridge)
    }

    /// Classification for this process, computed on first use.
    pub fn current() -> Environment {
        static CURRENT: OnceCell<Environment> = OnceCell::new();
        *CURRENT.get_or_init(|| {
            let env = classify(&EnvironmentProbe::gather());
            tracing::debug!(environment = env.as_str(), "classified execution environment");
            env
        })
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernel family the process is compiled for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelFamily {
    Linux,
    Darwin,
    Windows,
    Other,
}

impl KernelFamily {
    pub fn host() -> KernelFamily {
        if cfg!(target_os = "windows") {
            KernelFamily::Windows
        } else if cfg!(target_os = "macos") {
            KernelFamily::Darwin
        } else if cfg!(target_os = "linux") {
            KernelFamily::Linux
        } else {
            KernelFamily::Other
        }
    }
}

/// Raw inputs for classification, gathered once.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentProbe {
    /// Value of the `OS` variable (`Windows_NT` on Windows and Git Bash).
    pub os_marker: Option<String>,
    /// Value of `WSL_DISTRO_NAME`.
    pub wsl_distro: Option<String>,
    /// Contents of `/proc/version`.
    pub kernel_version: Option<String>,
    /// A Windows command-shell interpreter is on PATH.
    pub windows_shell_on_path: bool,
    pub kernel: Option<KernelFamily>,
}

/// Windows shell interpreters, in preference order.
pub const WINDOWS_SHELLS: &[&str] = &["powershell.exe", "pwsh.exe", "cmd.exe"];

impl EnvironmentProbe {
    pub fn gather() -> EnvironmentProbe {
        let non_empty = |k: &str| {
            std::env::var(k)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        EnvironmentProbe {
            os_marker: non_empty("OS"),
            wsl_distro: non_empty("WSL_DISTRO_NAME"),
            kernel_version: fs::read_to_string("/proc/version").ok(),
            windows_shell_on_path: WINDOWS_SHELLS.iter().any(|s| which(s).is_ok()),
            kernel: Some(KernelFamily::host()),
        }
    }
}

/// Classify an execution context from probe inputs.
///
/// Checks, in order: the Windows `OS` marker, a WSL distribution name, a
/// Microsoft/WSL kernel version string, and a Windows shell on PATH. The
/// first signal that fires decides between [`Environment::WindowsHost`] and
/// [`Environment::WslBridge`]; with none firing the kernel family decides.
pub fn classify(probe: &EnvironmentProbe) -> Environment {
    let kernel = probe.kernel.unwrap_or_else(KernelFamily::host);
    let windows_kernel = kernel == KernelFamily::Windows;

    if probe
        .os_marker
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("Windows_NT"))
    {
        // Linux processes only inherit OS=Windows_NT through WSL env sharing.
        return if windows_kernel || kernel == KernelFamily::Other {
            Environment::WindowsHost
        } else {
            Environment::WslBridge
        };
    }
    if probe.wsl_distro.is_some() {
        return Environment::WslBridge;
    }
    if probe
        .kernel_version
        .as_deref()
        .is_some_and(kernel_mentions_windows)
    {
        return Environment::WslBridge;
    }
    if probe.windows_shell_on_path {
        return if windows_kernel {
            Environment::WindowsHost
        } else {
            Environment::WslBridge
        };
    }
    match kernel {
        KernelFamily::Darwin => Environment::NativeMacos,
        KernelFamily::Windows => Environment::WindowsHost,
        KernelFamily::Linux | KernelFamily::Other => Environment::NativeLinux,
    }
}

fn kernel_mentions_windows(version: &str) -> bool {
    let lower = version.to_ascii_lowercase();
    lower.contains("microsoft") || lower.contains("wsl")
}
