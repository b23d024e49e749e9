// Exercises the `sentiment` binary's argument handling; none of these reach the network.

use std::process::Command;

fn sentiment() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sentiment"))
}

#[test]
fn missing_text_fails() {
    let output = sentiment().output().unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TEXT"), "stderr: {stderr}");
}

#[test]
fn extra_positionals_fail() {
    let output = sentiment().args(["I", "love", "this"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn unknown_model_fails() {
    let output = sentiment().args(["--model", "gpt-9", "hello"]).output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("gpt-9"), "stderr: {stderr}");
}

#[test]
fn help_prints_usage() {
    let output = sentiment().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: sentiment [OPTIONS] TEXT"));
}
