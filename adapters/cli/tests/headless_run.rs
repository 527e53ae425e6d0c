use std::process::Command;

fn level(name: &str) -> String {
    format!("{}/levels/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn headless_run_prints_a_json_report() {
    let output = Command::new(env!("CARGO_BIN_EXE_kiln"))
        .args([
            "--level",
            &level("smelter.toml"),
            "--config",
            &level("kiln.toml"),
            "--ticks",
            "30",
            "--inline",
        ])
        .output()
        .expect("failed to launch the kiln binary");

    assert!(
        output.status.success(),
        "kiln exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout holds a JSON report");
    assert_eq!(report["ticks"], 30);
    assert_eq!(report["events"]["time_advanced"], 30);
    assert!(report["entities"]
        .as_array()
        .is_some_and(|entities| !entities.is_empty()));
}

#[test]
fn missing_levels_fail_with_context() {
    let output = Command::new(env!("CARGO_BIN_EXE_kiln"))
        .args(["--level", &level("missing.toml"), "--ticks", "1"])
        .output()
        .expect("failed to launch the kiln binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loading level from"), "stderr: {stderr}");
}
