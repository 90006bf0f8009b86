//! lm-tap installer CLI entrypoint.
//!
//! This binary resolves, fetches, verifies, installs and smoke-tests the
//! Lunch Money CLI from its tap formulas, and reports on installed packages
//! and on the tap itself.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use lm_tap_installer::audit::audit_tap;
use lm_tap_installer::cli::{
    AuditArgs, Cli, Command, InfoArgs, InstallArgs, ListArgs, PackageArgs,
};
use lm_tap_installer::config::InstallerConfig;
use lm_tap_installer::dirs::{BaseDirs, SystemBaseDirs};
use lm_tap_installer::error::{InstallerError, Result};
use lm_tap_installer::fetch::{ArtefactFetcher, HttpFetcher};
use lm_tap_installer::formula::platform::HostPlatform;
use lm_tap_installer::formula::tap::Tap;
use lm_tap_installer::logging::init_logging;
use lm_tap_installer::output::{
    PackageInfo, format_audit, format_installed, format_installed_json, success_message,
    write_stderr_line,
};
use lm_tap_installer::pipeline::{
    DEFAULT_RETRY_DELAY, PipelineConfig, RetryPolicy, install_package, list_installed,
    uninstall_package,
};
use std::io::Write;

/// Everything a subcommand needs besides its own arguments.
struct RunContext<'a> {
    cli: &'a Cli,
    dirs: &'a dyn BaseDirs,
    config: InstallerConfig,
    tap: Tap,
}

impl RunContext<'_> {
    fn bin_dir(&self) -> Result<Utf8PathBuf> {
        self.config
            .resolve_bin_dir(self.cli.bin_dir.as_deref(), self.dirs)
    }
}

/// What a finished command asks the process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    /// The command ran but found problems (a failing audit).
    Failed,
}

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    if let Err(e) = init_logging(cli.verbosity, cli.quiet) {
        write_stderr_line(&mut stderr, format!("warning: {e}"));
    }
    let mut stdout = std::io::stdout().lock();
    let run_result = run(&cli, &SystemBaseDirs, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(
    cli: &Cli,
    dirs: &dyn BaseDirs,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<Outcome> {
    let context = RunContext {
        cli,
        dirs,
        config: InstallerConfig::discover(cli.config.as_deref(), dirs)?,
        tap: load_tap(cli.tap.as_deref())?,
    };

    match &cli.command {
        Command::Install(args) => run_install(&context, args, stderr),
        Command::Uninstall(args) => run_uninstall(&context, args, stderr),
        Command::List(args) => run_list(&context, args, stdout),
        Command::Info(args) => run_info(&context, args, stdout),
        Command::Audit(args) => run_audit(&context, args, stdout),
    }
}

fn load_tap(dir: Option<&Utf8Path>) -> Result<Tap> {
    let tap = match dir {
        Some(dir) => Tap::load_dir(dir)?,
        None => Tap::builtin()?,
    };
    Ok(tap)
}

fn run_install(
    context: &RunContext<'_>,
    args: &InstallArgs,
    stderr: &mut dyn Write,
) -> Result<Outcome> {
    let config = &context.config;
    let pipeline = PipelineConfig {
        host: HostPlatform::detect(),
        retry: RetryPolicy {
            retries: args.retries.unwrap_or(config.retries),
            base_delay: DEFAULT_RETRY_DELAY,
        },
        smoke_timeout: config.smoke_timeout(),
        skip_smoke_test: args.skip_smoke_test,
        quiet: context.cli.quiet,
        ..PipelineConfig::new(context.bin_dir()?)
    };
    let fetcher = HttpFetcher::new(config.fetch_timeout());

    let outcome = install_package(
        &context.tap,
        &args.package,
        args.release.as_deref(),
        &pipeline,
        &fetcher as &dyn ArtefactFetcher,
        stderr,
    )?;
    if !context.cli.quiet {
        write_stderr_line(stderr, success_message(&outcome));
    }
    Ok(Outcome::Success)
}

fn run_uninstall(
    context: &RunContext<'_>,
    args: &PackageArgs,
    stderr: &mut dyn Write,
) -> Result<Outcome> {
    let removed = uninstall_package(&context.tap, &args.package, &context.bin_dir()?)?;
    if !context.cli.quiet {
        write_stderr_line(
            stderr,
            format!(
                "Removed {} {} from {}",
                removed.package, removed.version, removed.binary_path
            ),
        );
    }
    Ok(Outcome::Success)
}

fn run_list(context: &RunContext<'_>, args: &ListArgs, stdout: &mut dyn Write) -> Result<Outcome> {
    let receipts = list_installed(&context.bin_dir()?)?;
    let text = if args.json {
        format_installed_json(&receipts).map_err(std::io::Error::other)?
    } else {
        format_installed(&receipts)
    };
    write_stdout(stdout, &text)?;
    Ok(Outcome::Success)
}

fn run_info(context: &RunContext<'_>, args: &InfoArgs, stdout: &mut dyn Write) -> Result<Outcome> {
    let formula = context
        .tap
        .formula(&args.package)
        .ok_or_else(|| InstallerError::UnknownPackage {
            name: args.package.clone(),
        })?;
    let installed = match context.bin_dir() {
        Ok(bin_dir) => list_installed(&bin_dir)?
            .into_iter()
            .find(|receipt| receipt.binary_name() == formula.binary),
        Err(InstallerError::NoBinDir) => None,
        Err(e) => return Err(e),
    };
    let host = HostPlatform::detect();
    let info = PackageInfo {
        formula,
        host: &host,
        installed: installed.as_ref(),
    };
    let text = if args.json {
        info.json().map_err(std::io::Error::other)?
    } else {
        info.display_text()
    };
    write_stdout(stdout, &text)?;
    Ok(Outcome::Success)
}

fn run_audit(
    context: &RunContext<'_>,
    args: &AuditArgs,
    stdout: &mut dyn Write,
) -> Result<Outcome> {
    let fetcher = HttpFetcher::new(context.config.fetch_timeout());
    let report = audit_tap(
        &context.tap,
        args.fetch.then_some(&fetcher as &dyn ArtefactFetcher),
    );
    write_stdout(stdout, &format_audit(&report))?;
    Ok(if report.is_clean() {
        Outcome::Success
    } else {
        Outcome::Failed
    })
}

fn write_stdout(stdout: &mut dyn Write, text: &str) -> Result<()> {
    writeln!(stdout, "{text}").map_err(|source| InstallerError::WriteFailed { source })
}

fn exit_code_for_run_result(result: Result<Outcome>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(Outcome::Success) => 0,
        Ok(Outcome::Failed) => 1,
        Err(err) => {
            write_stderr_line(stderr, format!("error ({} stage): {err}", err.stage()));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_tap_installer::fetch::FetchError;
    use rstest::rstest;
    use std::path::PathBuf;

    struct FixedDirs {
        root: PathBuf,
    }

    impl BaseDirs for FixedDirs {
        fn home_dir(&self) -> Option<PathBuf> {
            Some(self.root.clone())
        }

        fn bin_dir(&self) -> Option<PathBuf> {
            Some(self.root.join("bin"))
        }

        fn config_dir(&self) -> Option<PathBuf> {
            Some(self.root.join("config"))
        }
    }

    fn cli(args: &[&str]) -> Cli {
        temp_env::with_var_unset("LM_TAP_BIN_DIR", || {
            Cli::try_parse_from(std::iter::once("lm-tap").chain(args.iter().copied()))
                .expect("arguments parse")
        })
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(Outcome::Success), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[rstest]
    #[case::fetch(
        InstallerError::Fetch {
            package: "lm".to_owned(),
            version: "0.1.1".to_owned(),
            attempts: 3,
            source: FetchError::Timeout { url: "https://example.test/lm".to_owned() },
        },
        "error (fetch stage): failed to fetch lm 0.1.1"
    )]
    #[case::unknown_version(
        InstallerError::UnknownVersion {
            package: "lm".to_owned(),
            version: "9.9.9".to_owned(),
            available: "0.1.1".to_owned(),
        },
        "error (resolve stage): lm has no release 9.9.9"
    )]
    fn exit_code_for_run_result_names_stage_and_package(
        #[case] err: InstallerError,
        #[case] expected: &str,
    ) {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);
        let text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(text.starts_with(expected), "{text}");
    }

    #[test]
    fn failed_audit_exits_non_zero() {
        assert_eq!(exit_code_for_run_result(Ok(Outcome::Failed), &mut Vec::new()), 1);
    }

    #[test]
    fn list_on_empty_bin_dir_reports_nothing_installed() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = FixedDirs {
            root: temp.path().to_path_buf(),
        };
        let mut stdout = Vec::new();
        let outcome =
            run(&cli(&["list"]), &dirs, &mut stdout, &mut Vec::new()).expect("list runs");
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            String::from_utf8(stdout).expect("UTF-8"),
            "No packages installed.\n"
        );
    }

    #[rstest]
    #[case::list(&["--bin-dir", "", "list"])]
    #[case::install(&["--bin-dir", "", "install", "lm"])]
    fn empty_bin_dir_flag_is_rejected(#[case] args: &[&str]) {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = FixedDirs {
            root: temp.path().to_path_buf(),
        };
        let err = run(&cli(args), &dirs, &mut Vec::new(), &mut Vec::new())
            .expect_err("empty bin dir");
        assert!(matches!(err, InstallerError::InvalidBinDir { .. }), "{err}");
        assert_eq!(err.stage().to_string(), "setup");
    }

    #[test]
    fn info_for_unknown_package_fails() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = FixedDirs {
            root: temp.path().to_path_buf(),
        };
        let err = run(&cli(&["info", "nope"]), &dirs, &mut Vec::new(), &mut Vec::new())
            .expect_err("unknown package");
        assert!(matches!(err, InstallerError::UnknownPackage { .. }));
    }

    #[test]
    fn offline_audit_of_bundled_tap_passes() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = FixedDirs {
            root: temp.path().to_path_buf(),
        };
        let mut stdout = Vec::new();
        let outcome =
            run(&cli(&["audit"]), &dirs, &mut stdout, &mut Vec::new()).expect("audit runs");
        assert_eq!(outcome, Outcome::Success);
        let text = String::from_utf8(stdout).expect("UTF-8");
        assert!(text.contains("placeholder digest"), "{text}");
    }

    #[test]
    fn unknown_version_is_rejected_before_touching_bin_dir() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = FixedDirs {
            root: temp.path().to_path_buf(),
        };
        let err = run(
            &cli(&["install", "lm", "--version", "9.9.9"]),
            &dirs,
            &mut Vec::new(),
            &mut Vec::new(),
        )
        .expect_err("unknown version");
        assert!(matches!(err, InstallerError::UnknownVersion { .. }));
        assert!(!temp.path().join("bin").exists());
    }
}
