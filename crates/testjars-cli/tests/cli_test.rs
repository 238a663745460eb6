//! Integration tests for the `testjars` binary.
//!
//! Every invocation runs with `XDG_CONFIG_HOME` pointed at a temp dir and the
//! `TESTJARS_*` variables cleared, so the developer's own config never leaks
//! in.

use std::path::Path;
use std::process::{Command, Output};

use testjars_test_utils::FakeApplication;

const TESTJARS_VARS: [&str; 6] = [
    "TESTJARS_PORT_TIMEOUT_SECS",
    "TESTJARS_SHUTDOWN_GRACE_MS",
    "TESTJARS_EXECUTABLE",
    "TESTJARS_DEBUG",
    "TESTJARS_DEBUG_PORT",
    "TESTJARS_DEBUG_SUSPEND",
];

fn testjars(config_home: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_testjars"));
    cmd.args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env("RUST_LOG", "warn");
    for var in TESTJARS_VARS {
        cmd.env_remove(var);
    }
    cmd.output().expect("failed to run testjars binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn command_prints_port_file_and_main_class() {
    let home = tempfile::tempdir().unwrap();
    let cp = tempfile::tempdir().unwrap();
    let cp_arg = cp.path().to_string_lossy().into_owned();

    let output = testjars(
        home.path(),
        &[
            "command",
            "--executable",
            "/usr/bin/java",
            "-c",
            &cp_arg,
            "--main-class",
            "com.example.Main",
            "-D",
            "greeting=hello",
            "--debug",
        ],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let line = stdout(&output);
    assert!(line.starts_with("/usr/bin/java -agentlib:jdwp="), "{line}");
    assert!(line.contains("-DPORTFILE="), "{line}");
    assert!(line.contains("-Dgreeting=hello"), "{line}");
    assert!(line.contains("-Dserver.port=0"), "{line}");
    assert!(line.trim_end().ends_with("com.example.Main"), "{line}");
}

#[test]
fn command_rejects_blank_main_class() {
    let home = tempfile::tempdir().unwrap();
    let output = testjars(home.path(), &["command", "--main-class", " "]);
    assert!(!output.status.success());
}

#[test]
fn init_writes_config_and_refuses_to_overwrite() {
    let home = tempfile::tempdir().unwrap();

    let first = testjars(home.path(), &["init"]);
    assert!(first.status.success());
    let path = home.path().join("testjars").join("config.toml");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("timeout_secs = 120"), "{contents}");

    let second = testjars(home.path(), &["init"]);
    assert!(!second.status.success());
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));

    let forced = testjars(home.path(), &["init", "--force"]);
    assert!(forced.status.success());
}

#[test]
fn config_file_executable_is_used() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join("testjars");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "executable = \"/opt/from-config/java\"\n").unwrap();

    let output = testjars(home.path(), &["command", "--main-class", "Main"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("/opt/from-config/java "));
}

#[cfg(unix)]
#[test]
fn run_prints_discovered_port() {
    let home = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let cp = tempfile::tempdir().unwrap();
    let app = FakeApplication::new(12345).write(bin.path()).unwrap();
    let app_arg = app.to_string_lossy().into_owned();
    let cp_arg = cp.path().to_string_lossy().into_owned();

    let output = testjars(
        home.path(),
        &[
            "run",
            "--executable",
            &app_arg,
            "-c",
            &cp_arg,
            "--main-class",
            "Main",
            "--timeout",
            "20",
        ],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout(&output).trim(), "port=12345");
}

#[cfg(unix)]
#[test]
fn run_fails_when_application_dies() {
    let home = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let app = FakeApplication::failing(1).write(bin.path()).unwrap();
    let app_arg = app.to_string_lossy().into_owned();

    let output = testjars(
        home.path(),
        &["run", "--executable", &app_arg, "--main-class", "Main"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("did not report a port"));
}
