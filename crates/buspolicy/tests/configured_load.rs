//! End-to-end through the configuration layer: a TOML file names the
//! fragments and a static identity table, and the library loads, checks,
//! summarizes and exports exactly what the binary would.

use buspolicy::{check_status, export_json, render_summary, run_load, AppConfig, AppError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_layout(root: &Path) {
    let drop_in = root.join("session.d");
    fs::create_dir(&drop_in).unwrap();
    fs::write(
        root.join("session.conf"),
        r#"<busconfig>
  <policy context="default">
    <allow send_destination="*" eavesdrop="true"/>
    <allow own="*"/>
  </policy>
</busconfig>
"#,
    )
    .unwrap();
    fs::write(
        drop_in.join("10-portal.xml"),
        r#"<busconfig>
  <policy user="alice">
    <deny send_destination="org.example.Portal" send_member="Screenshot"/>
  </policy>
</busconfig>
"#,
    )
    .unwrap();
    fs::write(
        drop_in.join("20-broken.xml"),
        r#"<busconfig>
  <policy group="operators">
    <allow own="org.example.Ops"/>
  </policy>
</busconfig>
"#,
    )
    .unwrap();
    fs::write(drop_in.join("ignored.conf"), "not xml at all").unwrap();
}

fn write_config(root: &Path, fail_on_error: bool) -> std::path::PathBuf {
    let path = root.join("buspolicy.toml");
    let text = format!(
        r#"
[fragments]
primary = ["{root}/session.conf", "{root}/session-local.conf"]
drop_in_dirs = ["{root}/session.d"]
suffix = ".xml"

[identity]
resolver = "static"

[identity.users]
alice = 1000

[report]
fail_on_error = {fail_on_error}
"#,
        root = root.display(),
        fail_on_error = fail_on_error
    );
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn configured_load_reports_everything() {
    let dir = TempDir::new().unwrap();
    write_layout(dir.path());
    let config = AppConfig::load(&write_config(dir.path(), false)).unwrap();

    let report = run_load(&config, &[]);
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(report.missing, vec![dir.path().join("session-local.conf")]);

    // "operators" is not in the static table.
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].line(), Some(2));
    assert!(report.failures[0].to_string().contains("operators"));

    let summary = render_summary(&report);
    assert!(summary.contains("fragments: 2 loaded, 1 missing, 1 failed"));
    assert!(summary.contains("eavesdrop"));
    assert!(summary.contains("3 total"));

    // The configuration does not ask for failure, strict mode does.
    assert!(check_status(&report, &config, false).is_ok());
    assert!(matches!(
        check_status(&report, &config, true),
        Err(AppError::LoadFailed(1))
    ));
}

#[test]
fn fail_on_error_from_config() {
    let dir = TempDir::new().unwrap();
    write_layout(dir.path());
    let config = AppConfig::load(&write_config(dir.path(), true)).unwrap();

    let report = run_load(&config, &[]);
    assert!(check_status(&report, &config, false).is_err());
}

#[test]
fn explicit_files_override_config() {
    let dir = TempDir::new().unwrap();
    write_layout(dir.path());
    let config = AppConfig::load(&write_config(dir.path(), true)).unwrap();

    let report = run_load(&config, &[dir.path().join("session.d").join("10-portal.xml")]);
    assert!(check_status(&report, &config, false).is_ok());

    let json: serde_json::Value =
        serde_json::from_str(&export_json(&report.store).unwrap()).unwrap();
    let alice = &json["user_rules"]["1000"][0];
    assert_eq!(alice["disposition"], "deny");
    assert_eq!(alice["class"], "send");
    assert_eq!(alice["target_name"], "org.example.Portal");
    assert_eq!(alice["member"], "Screenshot");
}
