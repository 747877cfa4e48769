//! Binary-level tests for the pre-flight checks of `enroll`.
//!
//! None of these reach the browser: every failure here happens before
//! Chrome is launched.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn enroll() -> Command {
    let mut cmd = cargo_bin_cmd!("enroll");
    cmd.env_remove("ENROLL_COUNTRY_CODE")
        .env_remove("ENROLL_BATCH_SIZE")
        .env_remove("ENROLL_DEBUGGING_URL")
        .env_remove("ENROLL_CHROME")
        .env_remove("ENROLL_PROFILE_DIR");
    cmd
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_positional_arguments() {
        enroll()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("<GROUP>"))
            .stdout(predicate::str::contains("<ROSTER>"))
            .stdout(predicate::str::contains("--batch-size"));
    }

    #[test]
    fn test_version() {
        enroll().arg("--version").assert().success();
    }

    #[test]
    fn test_missing_arguments_is_usage_error() {
        enroll().assert().code(2);
        enroll().arg("Family").assert().code(2);
    }

    #[test]
    fn test_extra_argument_is_usage_error() {
        enroll()
            .args(["Family", "roster.txt", "unexpected"])
            .assert()
            .code(2);
    }

    #[test]
    fn test_zero_batch_size_is_usage_error() {
        let dir = TempDir::new().unwrap();
        enroll()
            .current_dir(dir.path())
            .args(["Family", "roster.txt", "--batch-size", "0"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("batch-size"));
    }
}

mod preflight {
    use super::*;

    #[test]
    fn test_missing_roster_fails_before_browser() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("state");

        enroll()
            .current_dir(dir.path())
            .arg("Family")
            .arg("does-not-exist.txt")
            .arg("--state-dir")
            .arg(&state)
            .assert()
            .code(3)
            .stderr(predicate::str::contains("does-not-exist.txt"));

        // Nothing was written for a run that never started.
        assert!(!state.exists());
    }

    #[test]
    fn test_roster_without_numbers_fails() {
        let dir = TempDir::new().unwrap();
        let roster = dir.path().join("roster.txt");
        fs::write(&roster, "\n  \nn/a\n").unwrap();

        enroll()
            .current_dir(dir.path())
            .arg("Family")
            .arg(&roster)
            .arg("--state-dir")
            .arg(dir.path().join("state"))
            .assert()
            .code(3)
            .stderr(predicate::str::contains("no usable phone numbers"));
    }

    #[test]
    fn test_invalid_config_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let roster = dir.path().join("roster.txt");
        fs::write(&roster, "9812345678\n").unwrap();
        let config = dir.path().join("enroll.toml");
        fs::write(&config, "[defaults\nbatch_size = ").unwrap();

        enroll()
            .current_dir(dir.path())
            .arg("Family")
            .arg(&roster)
            .arg("--config")
            .arg(&config)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Configuration error"));
    }

    #[test]
    fn test_country_code_without_digits_is_rejected() {
        let dir = TempDir::new().unwrap();
        let roster = dir.path().join("roster.txt");
        fs::write(&roster, "9812345678\n").unwrap();

        enroll()
            .current_dir(dir.path())
            .arg("Family")
            .arg(&roster)
            .args(["--country-code", "+"])
            .arg("--state-dir")
            .arg(dir.path().join("state"))
            .assert()
            .code(2)
            .stderr(predicate::str::contains("country code"));
    }
}
