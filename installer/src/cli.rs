//! CLI argument definitions for the lm-tap installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Install the Lunch Money CLI from its tap formulas.
#[derive(Parser, Debug)]
#[command(name = "lm-tap")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install the Lunch Money CLI (`lm`) from its tap formulas.\n\n",
    "Each install resolves a release for this machine, downloads the artifact ",
    "over HTTPS, checks its SHA-256 digest against the formula, places the ",
    "executable in the binary directory and runs it once to confirm it works. ",
    "Any failing step stops the install.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the latest release:\n",
    "    $ lm-tap install lm\n\n",
    "  Install a specific release into a custom directory:\n",
    "    $ lm-tap --bin-dir ~/bin install lm --version 0.1.1\n\n",
    "  Show what this machine would install:\n",
    "    $ lm-tap info lm\n\n",
    "  Check every published artifact against its digest:\n",
    "    $ lm-tap audit --fetch\n\n",
    "For more information, see: https://github.com/muinmomin/homebrew-lunchmoney-cli",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Load formulas from this directory instead of the bundled tap.
    #[arg(long, global = true, value_name = "DIR")]
    pub tap: Option<Utf8PathBuf>,

    /// Read configuration from this file [default: platform config dir].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Directory binaries are installed into [default: ~/.local/bin].
    #[arg(long, global = true, env = "LM_TAP_BIN_DIR", value_name = "DIR")]
    pub bin_dir: Option<Utf8PathBuf>,

    /// Increase diagnostic output (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch, verify, install and smoke-test a package.
    Install(InstallArgs),

    /// Remove an installed package.
    Uninstall(PackageArgs),

    /// List installed packages.
    List(ListArgs),

    /// Show a package's releases and the variant this machine selects.
    Info(InfoArgs),

    /// Check the tap's digests, optionally downloading every artifact.
    Audit(AuditArgs),
}

/// Arguments for the install command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct InstallArgs {
    /// Formula name or alias.
    pub package: String,

    /// Exact release to install [default: latest].
    #[arg(long = "version", value_name = "VERSION")]
    pub release: Option<String>,

    /// Do not run the installed binary after placing it.
    #[arg(long)]
    pub skip_smoke_test: bool,

    /// Extra download attempts after a fetch failure [default: 2].
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

/// Arguments naming a single package.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PackageArgs {
    /// Formula name or alias.
    pub package: String,
}

/// Arguments for the list command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the info command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct InfoArgs {
    /// Formula name or alias.
    pub package: String,

    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the audit command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditArgs {
    /// Download every published artifact and verify its digest.
    #[arg(long)]
    pub fetch: bool,
}
