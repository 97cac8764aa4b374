//! Command-line integration tests
//!
//! Exercises the modes that need no GPIO hardware: configuration saving,
//! printing and validation.
//!
//! Run with: `cargo test -p daemon --test cli_tests`

use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn daemon() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_card-presenced"));
    cmd.env_remove("RUST_LOG").env_remove("NOTIFY_SOCKET");
    cmd
}

const BOARD_REV_B: &str = r#"
[daemon]
log_level = "debug"

[gpio]
chip_label = "gpio-pxa"
consumer = "Card reader"
slots = [
    { slot = "sd", offset = 96 },
    { slot = "cf", offset = 97 },
]

[debounce]
quiet_period_ms = 250
"#;

#[test]
fn test_save_config_writes_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("daemon.toml");

    let output = daemon()
        .arg("--save-config")
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let saved = fs::read_to_string(&path).unwrap();
    assert!(saved.contains("chip_label = \"gpio-pxa\""));
    assert!(saved.contains("quirk = \"058f:6366:i\""));
    assert!(saved.contains("quiet_period_ms = 500"));
}

#[test]
fn test_print_config_merges_file_with_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("daemon.toml");
    fs::write(&path, BOARD_REV_B).unwrap();

    let output = daemon()
        .arg("--print-config")
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    assert!(printed.contains("offset = 96"));
    assert!(printed.contains("slot = \"cf\""));
    assert!(printed.contains("quiet_period_ms = 250"));
    // Untouched sections fall back to the board defaults
    assert!(printed.contains("interface = \"1-1.4:1.0\""));
}

#[test]
fn test_invalid_config_exits_with_setup_code() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("daemon.toml");
    fs::write(&path, "[debounce]\nquiet_period_ms = 0\n").unwrap();

    let output = daemon()
        .arg("--print-config")
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(6));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("quiet period"));
}

#[test]
fn test_missing_config_file_exits_with_setup_code() {
    let dir = tempdir().unwrap();

    let output = daemon()
        .arg("--print-config")
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn test_saved_config_round_trips_through_print() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("daemon.toml");

    assert!(
        daemon()
            .arg("--save-config")
            .arg("--config")
            .arg(&path)
            .status()
            .unwrap()
            .success()
    );

    let output = daemon()
        .arg("--print-config")
        .arg("--config")
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        fs::read_to_string(&path).unwrap()
    );
}

#[test]
fn test_invalid_config_at_default_path_is_not_ignored() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("card-presenced");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("daemon.toml"),
        "[gpio]\nslots = [{ slot = \"sd\", offset = 96 }]\n\n[debounce]\nquiet_period_ms = 0\n",
    )
    .unwrap();

    let output = daemon()
        .env("XDG_CONFIG_HOME", home.path())
        .arg("--print-config")
        .arg("-l")
        .arg("debug")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(6));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Invalid config file"));
    assert!(stderr.contains("quiet period"));
}

#[test]
fn test_config_at_default_path_is_loaded() {
    let home = tempdir().unwrap();
    let config_dir = home.path().join("card-presenced");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("daemon.toml"), BOARD_REV_B).unwrap();

    let output = daemon()
        .env("XDG_CONFIG_HOME", home.path())
        .arg("--print-config")
        .output()
        .unwrap();

    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    assert!(printed.contains("offset = 96"));
    assert!(printed.contains("quiet_period_ms = 250"));
}
