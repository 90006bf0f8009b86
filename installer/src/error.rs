//! Error types for the lm-tap installer.
//!
//! Every failure of the install pipeline maps to one [`InstallerError`]
//! variant that names the package and version involved. [`Stage`] tells the
//! top-level caller which step failed, and [`InstallerError::is_retryable`]
//! is the only place that decides whether trying again can help.

use crate::fetch::FetchError;
use crate::formula::error::FormulaError;
use crate::installer::InstallError;
use crate::smoke::SmokeError;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Pipeline step an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Loading configuration and formulas before any package work.
    Setup,
    /// Picking a descriptor and platform variant.
    Resolve,
    /// Downloading the artifact.
    Fetch,
    /// Checking the artifact digest.
    Verify,
    /// Placing the executable on disk.
    Install,
    /// Running the installed executable.
    SmokeTest,
    /// Writing results for the user.
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Install => "install",
            Self::SmokeTest => "smoke test",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while resolving, fetching, installing or testing
/// a package.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// No formula in the tap answers to the requested name.
    #[error("no formula named {name} in the tap")]
    UnknownPackage {
        /// The requested package name.
        name: String,
    },

    /// The formula has no release with the requested version.
    #[error("{package} has no release {version}; available: {available}")]
    UnknownVersion {
        /// The formula name.
        package: String,
        /// The requested version.
        version: String,
        /// Comma-separated list of published versions.
        available: String,
    },

    /// The release publishes no build for the host platform.
    #[error("{package} {version} has no build for {host}")]
    UnsupportedPlatform {
        /// The formula name.
        package: String,
        /// The selected release version.
        version: String,
        /// The host `(os, arch)` pair.
        host: String,
    },

    /// The release still carries the all-zero placeholder digest.
    #[error("{package} {version} is unpublished: its formula carries a placeholder digest")]
    PlaceholderDigest {
        /// The formula name.
        package: String,
        /// The release version.
        version: String,
    },

    /// Downloading the artifact failed.
    #[error("failed to fetch {package} {version} after {attempts} attempt(s): {source}")]
    Fetch {
        /// The formula name.
        package: String,
        /// The release version.
        version: String,
        /// How many downloads were tried.
        attempts: u32,
        /// The last transport failure.
        #[source]
        source: FetchError,
    },

    /// The downloaded bytes do not hash to the published digest.
    #[error(
        "checksum mismatch for {package} {version}: expected {expected}, got {actual}; \
         the download is corrupt or has been tampered with"
    )]
    DigestMismatch {
        /// The formula name.
        package: String,
        /// The release version.
        version: String,
        /// Digest recorded in the formula.
        expected: String,
        /// Digest of the downloaded bytes.
        actual: String,
    },

    /// Unpacking or placing the executable on disk failed.
    #[error("failed to install {package} {version}: {source}")]
    Install {
        /// The formula name.
        package: String,
        /// The release version.
        version: String,
        /// The filesystem or archive failure.
        #[source]
        source: InstallError,
    },

    /// Removing an installed binary failed.
    #[error("failed to uninstall {package}: {source}")]
    Uninstall {
        /// The formula name.
        package: String,
        /// The filesystem failure.
        #[source]
        source: InstallError,
    },

    /// Another process holds the install lock and it could not be acquired.
    #[error("failed to lock {path}: {reason}")]
    LockFailed {
        /// Path of the lock file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The installed executable did not pass its smoke test.
    #[error("smoke test failed for {package} {version}: {source}")]
    VerificationFailed {
        /// The formula name.
        package: String,
        /// The release version.
        version: String,
        /// What the smoke test observed.
        #[source]
        source: SmokeError,
    },

    /// A formula file is malformed.
    #[error(transparent)]
    InvalidFormula(#[from] FormulaError),

    /// The configuration file could not be loaded.
    #[error("invalid configuration {path}: {reason}")]
    Config {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The binary directory could not be determined.
    #[error("could not determine a binary directory; pass --bin-dir or set LM_TAP_BIN_DIR")]
    NoBinDir,

    /// The binary directory is empty or cannot be made absolute.
    #[error("invalid binary directory {path:?}: {reason}")]
    InvalidBinDir {
        /// The directory as given.
        path: Utf8PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// Uninstall was requested for a package without a receipt.
    #[error("{package} is not installed in {bin_dir}")]
    NotInstalled {
        /// The requested package name.
        package: String,
        /// The binary directory that was searched.
        bin_dir: Utf8PathBuf,
    },

    /// An I/O operation outside the install step failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl InstallerError {
    /// Return the pipeline step this error belongs to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::UnknownPackage { .. }
            | Self::UnknownVersion { .. }
            | Self::UnsupportedPlatform { .. } => Stage::Resolve,
            Self::Fetch { .. } => Stage::Fetch,
            Self::PlaceholderDigest { .. } | Self::DigestMismatch { .. } => Stage::Verify,
            Self::Install { .. }
            | Self::Uninstall { .. }
            | Self::LockFailed { .. }
            | Self::NotInstalled { .. } => Stage::Install,
            Self::VerificationFailed { .. } => Stage::SmokeTest,
            Self::WriteFailed { .. } => Stage::Output,
            Self::InvalidFormula(_)
            | Self::Config { .. }
            | Self::NoBinDir
            | Self::InvalidBinDir { .. }
            | Self::Io(_) => Stage::Setup,
        }
    }

    /// Whether the caller may retry the whole operation.
    ///
    /// Only transport failures qualify. Integrity and correctness failures
    /// must surface unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn mismatch() -> InstallerError {
        InstallerError::DigestMismatch {
            package: "lm".to_owned(),
            version: "0.1.3".to_owned(),
            expected: "a".repeat(64),
            actual: "b".repeat(64),
        }
    }

    fn fetch_failure() -> InstallerError {
        InstallerError::Fetch {
            package: "lm".to_owned(),
            version: "0.1.3".to_owned(),
            attempts: 3,
            source: FetchError::Status {
                url: "https://example.test/lm.tar.gz".to_owned(),
                status: 503,
            },
        }
    }

    #[test]
    fn digest_mismatch_names_package_version_and_both_digests() {
        let msg = mismatch().to_string();
        assert!(msg.contains("lm 0.1.3"));
        assert!(msg.contains(&"a".repeat(64)));
        assert!(msg.contains(&"b".repeat(64)));
    }

    #[test]
    fn fetch_error_reports_attempts_and_preserves_source() {
        let err = fetch_failure();
        assert!(err.to_string().contains("after 3 attempt(s)"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[rstest]
    #[case::fetch(fetch_failure(), true)]
    #[case::mismatch(mismatch(), false)]
    #[case::smoke(
        InstallerError::VerificationFailed {
            package: "lm".to_owned(),
            version: "0.1.3".to_owned(),
            source: SmokeError::MissingOutput {
                expected: "Lunch Money CLI".to_owned(),
                output: "hello".to_owned(),
            },
        },
        false
    )]
    fn only_fetch_errors_are_retryable(#[case] err: InstallerError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }

    #[rstest]
    #[case::unknown_version(
        InstallerError::UnknownVersion {
            package: "lm".to_owned(),
            version: "9.9.9".to_owned(),
            available: "0.1.1".to_owned(),
        },
        Stage::Resolve
    )]
    #[case::placeholder(
        InstallerError::PlaceholderDigest {
            package: "lunchmoney-cli".to_owned(),
            version: "0.0.0".to_owned(),
        },
        Stage::Verify
    )]
    #[case::mismatch(mismatch(), Stage::Verify)]
    #[case::fetch(fetch_failure(), Stage::Fetch)]
    #[case::io(InstallerError::Io(std::io::Error::other("boom")), Stage::Setup)]
    fn errors_report_their_stage(#[case] err: InstallerError, #[case] stage: Stage) {
        assert_eq!(err.stage(), stage);
    }

    #[test]
    fn stage_display_is_human_readable() {
        assert_eq!(Stage::SmokeTest.to_string(), "smoke test");
        assert_eq!(Stage::Fetch.to_string(), "fetch");
    }

    #[test]
    fn write_failed_preserves_source() {
        let err = InstallerError::WriteFailed {
            source: std::io::Error::other("broken pipe"),
        };
        assert!(err.to_string().contains("write"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
