//! Install pipeline orchestration.
//!
//! Runs resolve, fetch, verify, install and smoke test strictly in that
//! order and stops at the first failure. Nothing touches the binary
//! directory until the artifact digest has been verified, and only fetch
//! failures are ever retried.

use crate::error::{InstallerError, Result};
use crate::extraction::{ArtifactFormat, executable_payload};
use crate::fetch::{ArtefactFetcher, FetchError};
use crate::formula::descriptor::PackageDescriptor;
use crate::formula::platform::HostPlatform;
use crate::formula::tap::{Resolution, Tap};
use crate::installer::{InstallError, InstallRequest, Installer};
use crate::output::write_stderr_line;
use crate::receipt::InstalledArtifact;
use crate::smoke::{DEFAULT_SMOKE_TIMEOUT, SmokeReport, run_smoke_test};
use crate::verify::{VerifyError, ensure_published, verify_bytes};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::io::Write;
use std::thread;
use std::time::Duration;

/// Default number of retries after a failed download.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How failed downloads are retried.
///
/// Delays double after each attempt: with the defaults the pipeline waits
/// 500 ms, then 1 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first download fails.
    pub retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the binary is installed into.
    pub bin_dir: Utf8PathBuf,
    /// Platform used to pick a variant.
    pub host: HostPlatform,
    /// Download retry behaviour.
    pub retry: RetryPolicy,
    /// Bound on the smoke test.
    pub smoke_timeout: Duration,
    /// Skip running the installed binary.
    pub skip_smoke_test: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

impl PipelineConfig {
    /// Configuration with defaults for everything but the binary directory.
    #[must_use]
    pub fn new(bin_dir: Utf8PathBuf) -> Self {
        Self {
            bin_dir,
            host: HostPlatform::detect(),
            retry: RetryPolicy::default(),
            smoke_timeout: DEFAULT_SMOKE_TIMEOUT,
            skip_smoke_test: false,
            quiet: false,
        }
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// The receipt that was written.
    pub artifact: InstalledArtifact,
    /// The smoke test report, unless the smoke test was skipped.
    pub smoke: Option<SmokeReport>,
}

/// Resolve, fetch, verify, install and smoke-test `name`.
///
/// # Errors
///
/// Returns the [`InstallerError`] of the first stage that fails. Resolution
/// and placeholder errors are reported before any download starts; digest
/// errors before anything is written.
pub fn install_package(
    tap: &Tap,
    name: &str,
    version: Option<&str>,
    config: &PipelineConfig,
    fetcher: &dyn ArtefactFetcher,
    stderr: &mut dyn Write,
) -> Result<InstallOutcome> {
    let resolution = tap.resolve(name, version, &config.host)?;
    let Resolution {
        descriptor,
        variant,
    } = resolution;
    let installer = Installer::open(&config.bin_dir)?;

    ensure_published(&variant.expected_digest).map_err(|e| verify_failure(descriptor, e))?;

    progress(
        config,
        stderr,
        format!(
            "Fetching {} {} for {} from {}...",
            descriptor.name, descriptor.version, variant.platform, variant.url
        ),
    );
    let bytes = fetch_with_retry(fetcher, &variant.url, descriptor, config.retry)?;

    verify_bytes(&variant.expected_digest, &bytes).map_err(|e| verify_failure(descriptor, e))?;
    debug!("verified sha256 {}", variant.expected_digest);

    let format = ArtifactFormat::from_url(&variant.url);
    let executable = executable_payload(format, &bytes, &descriptor.binary)
        .map_err(|e| install_failure(descriptor, InstallError::from(e)))?;

    let lock = installer
        .lock(&descriptor.binary)
        .map_err(|e| install_failure(descriptor, e))?;
    let artifact = installer
        .install(
            &lock,
            &InstallRequest {
                descriptor,
                variant,
                executable: &executable,
            },
        )
        .map_err(|e| install_failure(descriptor, e))?;
    progress(
        config,
        stderr,
        format!("Installed {} to {}", descriptor.binary, artifact.binary_path),
    );

    let smoke = if config.skip_smoke_test {
        debug!("smoke test skipped");
        None
    } else {
        progress(config, stderr, format!("Smoke testing {}...", artifact.binary_path));
        let spec = &descriptor.smoke_test;
        let report = run_smoke_test(&artifact.binary_path, spec, config.smoke_timeout)
            .map_err(|source| InstallerError::VerificationFailed {
                package: descriptor.name.clone(),
                version: descriptor.version.to_string(),
                source,
            })?;
        Some(report)
    };
    drop(lock);

    Ok(InstallOutcome { artifact, smoke })
}

/// Remove the binary installed for `name` and its receipt.
///
/// # Errors
///
/// Returns [`InstallerError::UnknownPackage`] if the tap has no such
/// formula, [`InstallerError::NotInstalled`] if there is no receipt, or an
/// install error if removal fails.
pub fn uninstall_package(tap: &Tap, name: &str, bin_dir: &Utf8Path) -> Result<InstalledArtifact> {
    let formula = tap
        .formula(name)
        .ok_or_else(|| InstallerError::UnknownPackage {
            name: name.to_owned(),
        })?;
    let installer = Installer::open(bin_dir)?;
    installer
        .uninstall(&formula.binary)
        .map_err(|source| InstallerError::Uninstall {
            package: formula.name.clone(),
            source,
        })?
        .ok_or_else(|| InstallerError::NotInstalled {
            package: name.to_owned(),
            bin_dir: installer.bin_dir().to_owned(),
        })
}

/// Every receipt in `bin_dir`.
///
/// # Errors
///
/// Returns an I/O error if the receipts directory cannot be listed.
pub fn list_installed(bin_dir: &Utf8Path) -> Result<Vec<InstalledArtifact>> {
    Ok(Installer::open(bin_dir)?.receipts().list()?)
}

fn fetch_with_retry(
    fetcher: &dyn ArtefactFetcher,
    url: &str,
    descriptor: &PackageDescriptor,
    retry: RetryPolicy,
) -> Result<Vec<u8>> {
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        match fetcher.fetch(url) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt <= retry.retries => {
                let delay = retry.delay_after(attempt);
                warn!("attempt {attempt} failed: {err}; retrying in {delay:?}");
                thread::sleep(delay);
            }
            Err(source) => return Err(fetch_failure(descriptor, attempt, source)),
        }
    }
}

fn fetch_failure(
    descriptor: &PackageDescriptor,
    attempts: u32,
    source: FetchError,
) -> InstallerError {
    InstallerError::Fetch {
        package: descriptor.name.clone(),
        version: descriptor.version.to_string(),
        attempts,
        source,
    }
}

fn verify_failure(descriptor: &PackageDescriptor, err: VerifyError) -> InstallerError {
    let package = descriptor.name.clone();
    let version = descriptor.version.to_string();
    match err {
        VerifyError::Placeholder => InstallerError::PlaceholderDigest { package, version },
        VerifyError::Mismatch { expected, actual } => InstallerError::DigestMismatch {
            package,
            version,
            expected: expected.into_inner(),
            actual: actual.into_inner(),
        },
    }
}

fn install_failure(descriptor: &PackageDescriptor, err: InstallError) -> InstallerError {
    match err {
        InstallError::Lock { path, source } => InstallerError::LockFailed {
            path,
            reason: source.to_string(),
        },
        source => InstallerError::Install {
            package: descriptor.name.clone(),
            version: descriptor.version.to_string(),
            source,
        },
    }
}

fn progress(config: &PipelineConfig, stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if !config.quiet {
        write_stderr_line(stderr, message);
    }
}
