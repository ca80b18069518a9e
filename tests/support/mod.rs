/*!
Test support helpers shared across integration tests.

- bridge(home): `ti-bridge` command isolated from the user's config and colors
- host_monitor(home): same for `ti-host-monitor`
- native_host(): true when the bridge classifies this machine as native Linux/macOS

Tests that depend on the host classification skip themselves with a
"skipping: ..." line rather than failing on WSL/Windows runners.
*/

use std::path::Path;
use std::process::Command;

fn isolated(bin: &str, home: &Path) -> Command {
    let mut cmd = Command::new(bin);
    cmd.env("TI_BRIDGE_CONFIG", home.join("ti-bridge.yml"))
        .env("NO_COLOR", "1")
        .env_remove("TI_BRIDGE_PROJECT_DIR")
        .env_remove("TI_BRIDGE_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[allow(dead_code)]
pub fn bridge(home: &Path) -> Command {
    isolated(env!("CARGO_BIN_EXE_ti-bridge"), home)
}

#[allow(dead_code)]
pub fn host_monitor(home: &Path) -> Command {
    isolated(env!("CARGO_BIN_EXE_ti-host-monitor"), home)
}

/// Classification reported by `ti-bridge env`.
#[allow(dead_code)]
pub fn classification() -> String {
    let td = tempfile::tempdir().expect("tmpdir");
    let out = bridge(td.path())
        .arg("env")
        .output()
        .expect("run ti-bridge env");
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[allow(dead_code)]
pub fn native_host() -> bool {
    matches!(classification().as_str(), "native-linux" | "native-macos")
}

#[allow(dead_code)]
pub fn stderr_of(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}
