use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn tnctl(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tnctl").unwrap();
    cmd.env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("HOME", dir)
        .env("TRUENAS_CLIENT_BACKEND", "stub")
        .env("TRUENAS_STUB_STATE", dir.join("state.json"))
        .env("TRUENAS_APP_CONFIG_ROOT", dir.join("apps"))
        .env_remove("TRUENAS_STUB_WORKSPACE");
    cmd
}

fn run_ok(cmd: &mut Command) -> Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

fn run_err(cmd: &mut Command) -> Value {
    let out = cmd.assert().failure().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

const NIGHTLY: [&str; 8] = [
    "cronjob",
    "--name",
    "nightly backup",
    "--command",
    "/usr/local/bin/backup.sh",
    "--minute",
    "0",
    "--hour=2",
];

#[test]
fn cronjob_create_is_idempotent() {
    let dir = TempDir::new().unwrap();

    let first = run_ok(tnctl(dir.path()).args(NIGHTLY));
    assert_eq!(first["action"], "CREATE");
    assert_eq!(first["changed"], true);
    assert_eq!(first["diff"]["before"], Value::Null);
    assert_eq!(first["diff"]["after"]["schedule"]["dom"], "*");
    assert_eq!(first["cronjob"]["id"], 1);
    assert_eq!(first["message"], "Cron job 'nightly backup' was created");

    let second = run_ok(tnctl(dir.path()).args(NIGHTLY));
    assert_eq!(second["action"], "NONE");
    assert_eq!(second["changed"], false);
}

#[test]
fn check_mode_does_not_persist() {
    let dir = TempDir::new().unwrap();

    let dry = run_ok(tnctl(dir.path()).arg("--check").args(NIGHTLY));
    assert_eq!(dry["action"], "CREATE");
    assert_eq!(dry["cronjob"], Value::Null);
    assert_eq!(dry["message"], "Cron job 'nightly backup' would be created");

    let real = run_ok(tnctl(dir.path()).args(NIGHTLY));
    assert_eq!(real["action"], "CREATE");
}

#[test]
fn cronjob_from_params_file_and_removal() {
    let dir = TempDir::new().unwrap();
    let params = dir.path().join("job.yaml");
    fs::write(
        &params,
        "name: rotate\ncommand: /usr/sbin/logrotate\nschedule:\n  minute: 0\n  hour: 3\n",
    )
    .unwrap();

    let created = run_ok(tnctl(dir.path()).args(["cronjob", "--file"]).arg(&params));
    assert_eq!(created["action"], "CREATE");
    assert_eq!(created["cronjob"]["schedule"]["minute"], "0");

    let same_via_flags = run_ok(tnctl(dir.path()).args([
        "cronjob", "--name", "rotate", "--command", "/usr/sbin/logrotate", "--minute", "0", "--hour", "3",
    ]));
    assert_eq!(same_via_flags["action"], "NONE");

    let removed = run_ok(tnctl(dir.path()).args(["cronjob", "--name", "rotate", "--state", "absent"]));
    assert_eq!(removed["action"], "DELETE");
    assert!(removed.get("diff").is_none());

    let gone = run_ok(tnctl(dir.path()).args(["cronjob", "--name", "rotate", "--state", "absent"]));
    assert_eq!(gone["action"], "NONE");
    assert_eq!(gone["message"], "Cron job 'rotate' is already absent");
}

#[test]
fn params_file_excludes_flags() {
    let dir = TempDir::new().unwrap();
    let params = dir.path().join("job.yaml");
    fs::write(&params, "name: rotate\ncommand: /usr/sbin/logrotate\n").unwrap();

    tnctl(dir.path())
        .args(["cronjob", "--state", "absent", "--file"])
        .arg(&params)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
    assert!(!dir.path().join("state.json").exists());

    let compose = dir.path().join("compose.yaml");
    fs::write(&compose, "services: {}\n").unwrap();
    tnctl(dir.path())
        .args(["app", "--file"])
        .arg(&params)
        .arg("--compose")
        .arg(&compose)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));

    let absent = dir.path().join("absent.yaml");
    fs::write(&absent, "name: rotate\nstate: absent\n").unwrap();
    let removed = run_ok(tnctl(dir.path()).args(["cronjob", "--file"]).arg(&absent));
    assert_eq!(removed["action"], "NONE");
    assert_eq!(removed["state"], "absent");
}

#[test]
fn cronjob_without_command_fails() {
    let dir = TempDir::new().unwrap();
    let err = run_err(tnctl(dir.path()).args(["cronjob", "--name", "x"]));
    assert_eq!(err["failed"], true);
    assert!(err["msg"].as_str().unwrap().contains("command"));
}

#[test]
fn app_lifecycle() {
    let dir = TempDir::new().unwrap();
    let compose = dir.path().join("compose.yaml");
    fs::write(&compose, "services:\n  redis:\n    image: redis:alpine\n").unwrap();

    let created = run_ok(tnctl(dir.path()).args(["app", "--name", "redis", "--compose"]).arg(&compose));
    assert_eq!(created["action"], "CREATE");
    assert_eq!(created["application"]["state"], "DEPLOYING");
    assert!(dir.path().join("apps/redis/versions/1/user_config.yaml").is_file());

    let same = run_ok(tnctl(dir.path()).args(["app", "--name", "redis", "--compose"]).arg(&compose));
    assert_eq!(same["action"], "NONE");
    assert_eq!(same["diff"]["before"], same["diff"]["after"]);

    fs::write(&compose, "{\"services\": {\"redis\": {\"image\": \"redis:7\"}}}").unwrap();
    let updated = run_ok(tnctl(dir.path()).args(["app", "--name", "redis", "--compose"]).arg(&compose));
    assert_eq!(updated["action"], "UPDATE");
    assert_eq!(updated["diff"]["before"]["services"]["redis"]["image"], "redis:alpine");
    assert_eq!(updated["diff"]["after"]["services"]["redis"]["image"], "redis:7");

    let restarted = run_ok(tnctl(dir.path()).args(["app", "--name", "redis", "--state", "restarted"]));
    assert_eq!(restarted["action"], "RESTART");
    assert_eq!(restarted["changed"], true);

    let removed = run_ok(tnctl(dir.path()).args(["app", "--name", "redis", "--state", "absent"]));
    assert_eq!(removed["action"], "DELETE");
}

#[test]
fn restarting_absent_app_fails() {
    let dir = TempDir::new().unwrap();
    let err = run_err(tnctl(dir.path()).args(["app", "--name", "redis", "--state", "restarted"]));
    assert_eq!(err["msg"], "Application 'redis' is absent; cannot restart");
}

#[test]
fn missing_manifest_fails_loudly() {
    let dir = TempDir::new().unwrap();
    let compose = dir.path().join("compose.yaml");
    fs::write(&compose, "services: {}\n").unwrap();
    run_ok(tnctl(dir.path()).args(["app", "--name", "web", "--compose"]).arg(&compose));
    fs::remove_file(dir.path().join("apps/web/versions/1/user_config.yaml")).unwrap();

    let err = run_err(tnctl(dir.path()).args(["--check", "app", "--name", "web", "--compose"]).arg(&compose));
    assert!(err["msg"].as_str().unwrap().starts_with("Unable to read"));
}

#[test]
fn unknown_state_is_rejected_by_cli() {
    let dir = TempDir::new().unwrap();
    tnctl(dir.path())
        .args(["app", "--name", "redis", "--state", "stopped"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown state 'stopped'"));
}
