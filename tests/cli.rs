//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_main_command_help() {
    let mut cmd = Command::cargo_bin("sgpt").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn test_serve_command_help() {
    let mut cmd = Command::cargo_bin("sgpt").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Port to listen on"))
        .stdout(predicate::str::contains("backend"));
}

#[test]
fn test_chat_command_help() {
    let mut cmd = Command::cargo_bin("sgpt").unwrap();
    cmd.arg("chat").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("inference server"))
        .stdout(predicate::str::contains("--stream"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let mut cmd = Command::cargo_bin("sgpt").unwrap();
    cmd.arg("frobnicate");

    cmd.assert().failure();
}

#[test]
fn test_serve_rejects_unknown_backend() {
    let mut cmd = Command::cargo_bin("sgpt").unwrap();
    cmd.arg("serve").arg("--backend").arg("frobnicate");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unknown completion backend"));
}
