/// CLI smoke tests for the `debug-mediatord` binary's argument parsing.
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_describes_the_daemon() {
    let mut cmd = Command::cargo_bin("debug-mediatord").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Session daemon unifying DAP and CDP debugging behind one TCP protocol",
        ));
}

#[test]
fn missing_required_args_is_a_usage_error() {
    let mut cmd = Command::cargo_bin("debug-mediatord").unwrap();
    cmd.assert().failure().stderr(predicate::str::contains("--port"));
}
