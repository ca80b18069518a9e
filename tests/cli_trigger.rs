mod support;

use std::fs;

#[test]
fn test_trigger_writes_signal_and_keeps_siblings() {
    let home = tempfile::tempdir().expect("tmpdir");
    let project = tempfile::tempdir().expect("tmpdir");
    let meta = project.path().join(".ti-csc-info");
    fs::create_dir_all(&meta).unwrap();
    fs::write(meta.join("project_status.json"), "{\"ok\":true}").unwrap();

    let out = support::bridge(home.path())
        .args(["trigger", "--url", "http://localhost:8080/?a=1&b=2", "--project-dir"])
        .arg(project.path())
        .output()
        .expect("run ti-bridge trigger");
    assert!(out.status.success(), "{}", support::stderr_of(&out));

    let body = fs::read(meta.join("launch_browser_trigger.json")).expect("trigger written");
    let v: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(v["action"], "launch_browser");
    assert_eq!(v["url"], "http://localhost:8080/?a=1&b=2");
    assert!(v["timestamp"].as_f64().is_some_and(|t| t > 1.0e9));
    assert_eq!(
        fs::read_to_string(meta.join("project_status.json")).unwrap(),
        "{\"ok\":true}"
    );
    let leftovers: Vec<_> = fs::read_dir(&meta)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_trigger_uses_project_env_fallback() {
    let home = tempfile::tempdir().expect("tmpdir");
    let project = tempfile::tempdir().expect("tmpdir");
    let out = support::bridge(home.path())
        .args(["trigger", "--url", "https://example.org/"])
        .env("TI_BRIDGE_PROJECT_DIR", project.path())
        .output()
        .expect("run ti-bridge trigger");
    assert!(out.status.success(), "{}", support::stderr_of(&out));
    assert!(project
        .path()
        .join(".ti-csc-info")
        .join("launch_browser_trigger.json")
        .is_file());
}

#[test]
fn test_trigger_refuses_non_http_url() {
    let home = tempfile::tempdir().expect("tmpdir");
    let project = tempfile::tempdir().expect("tmpdir");
    let out = support::bridge(home.path())
        .args(["trigger", "--url", "file:///etc/passwd", "--project-dir"])
        .arg(project.path())
        .output()
        .expect("run ti-bridge trigger");
    assert_eq!(out.status.code(), Some(1));
    assert!(support::stderr_of(&out).contains("http/https only"));
    assert!(!project.path().join(".ti-csc-info").exists());
}

#[test]
fn test_trigger_missing_project_dir() {
    let home = tempfile::tempdir().expect("tmpdir");
    let out = support::bridge(home.path())
        .args(["trigger", "--url", "http://localhost:1", "--project-dir"])
        .arg(home.path().join("does-not-exist"))
        .output()
        .expect("run ti-bridge trigger");
    assert_eq!(out.status.code(), Some(1));
    assert!(support::stderr_of(&out).contains("project directory not usable"));
}

#[test]
fn test_trigger_honours_metadata_dir_override() {
    let home = tempfile::tempdir().expect("tmpdir");
    let project = tempfile::tempdir().expect("tmpdir");
    fs::write(home.path().join("ti-bridge.yml"), "metadata_dir: .bridge\n").unwrap();
    let out = support::bridge(home.path())
        .args(["trigger", "--url", "http://localhost:1", "--project-dir"])
        .arg(project.path())
        .output()
        .expect("run ti-bridge trigger");
    assert!(out.status.success(), "{}", support::stderr_of(&out));
    assert!(project
        .path()
        .join(".bridge")
        .join("launch_browser_trigger.json")
        .is_file());
}
