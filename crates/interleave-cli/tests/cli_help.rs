use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("interleave")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("--log-file"));
}

#[test]
fn test_chat_help_shows_options() {
    cargo_bin_cmd!("interleave")
        .args(["chat", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--ws"))
        .stdout(predicate::str::contains("--thinking-budget"))
        .stdout(predicate::str::contains("--max-tokens"));
}

#[test]
fn test_serve_help_shows_bind_options() {
    cargo_bin_cmd!("interleave")
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("interleave")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_unknown_command_fails() {
    cargo_bin_cmd!("interleave")
        .arg("frobnicate")
        .assert()
        .failure();
}
