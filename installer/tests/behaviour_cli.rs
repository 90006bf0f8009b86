//! End-to-end CLI behaviour tests for `lm-tap`.
//!
//! These scenarios invoke the installer binary against a temporary binary
//! directory and home, so nothing here touches the network or the real
//! user configuration.

use rstest::fixture;
use rstest_bdd_macros::{scenario, then, when};
use std::cell::RefCell;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliWorld {
    temp_dir: TempDir,
    output: RefCell<Option<Output>>,
}

#[fixture]
fn cli_world() -> CliWorld {
    CliWorld {
        temp_dir: tempfile::tempdir().expect("create temp dir"),
        output: RefCell::new(None),
    }
}

impl CliWorld {
    fn stream(&self, pick: fn(&Output) -> &[u8]) -> String {
        let output = self.output.borrow();
        let output = output.as_ref().expect("command was run");
        String::from_utf8_lossy(pick(output)).into_owned()
    }
}

#[when("lm-tap runs with {args}")]
fn when_runs(cli_world: &CliWorld, args: String) {
    let home = cli_world.temp_dir.path();
    let output = Command::new(env!("CARGO_BIN_EXE_lm-tap"))
        .arg("--bin-dir")
        .arg(home.join("bin"))
        .args(args.split_whitespace())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env_remove("LM_TAP_BIN_DIR")
        .env_remove("LM_TAP_LOG")
        .output()
        .expect("run lm-tap");
    cli_world.output.replace(Some(output));
}

#[then("the command exits with code {code:i32}")]
fn then_exit_code(cli_world: &CliWorld, code: i32) {
    let output = cli_world.output.borrow();
    let output = output.as_ref().expect("command was run");
    assert_eq!(
        output.status.code(),
        Some(code),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[then("stdout contains {text}")]
fn then_stdout_contains(cli_world: &CliWorld, text: String) {
    let stdout = cli_world.stream(|o| &o.stdout);
    assert!(stdout.contains(&text), "stdout: {stdout}");
}

#[then("stderr contains {text}")]
fn then_stderr_contains(cli_world: &CliWorld, text: String) {
    let stderr = cli_world.stream(|o| &o.stderr);
    assert!(stderr.contains(&text), "stderr: {stderr}");
}

#[scenario(path = "tests/features/cli.feature", name = "Help lists the subcommands")]
fn scenario_help(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "An unknown release names the failing stage"
)]
fn scenario_unknown_release(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "An empty binary directory lists nothing"
)]
fn scenario_empty_list(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Info reports the bundled formula as JSON"
)]
fn scenario_info_json(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "An offline audit of the bundled tap passes with warnings"
)]
fn scenario_offline_audit(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Uninstalling a package that is not installed fails"
)]
fn scenario_uninstall_missing(cli_world: CliWorld) {
    let _ = cli_world;
}
