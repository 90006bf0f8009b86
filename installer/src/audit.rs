//! Tap integrity audit.
//!
//! Ledger invariants are enforced when formulas are parsed, so loading a
//! tap already proves them. The audit adds the checks that need more than
//! the formula text: which releases are still unpublished placeholders and,
//! when a fetcher is supplied, whether every published artifact hashes to
//! its recorded digest.

use crate::fetch::ArtefactFetcher;
use crate::formula::platform::Platform;
use crate::formula::sha256_digest::Sha256Digest;
use crate::formula::tap::Tap;
use crate::verify::{VerifyError, verify_bytes};
use log::{debug, info};
use std::fmt;

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Worth knowing; does not fail the audit.
    Warning,
    /// The tap is broken.
    Failure,
}

/// What the audit found wrong with one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingKind {
    /// The digest is the all-zero placeholder.
    Placeholder,
    /// The artifact could not be downloaded.
    FetchFailed {
        /// The fetch error message.
        reason: String,
    },
    /// The artifact hashes to a different digest.
    DigestMismatch {
        /// Digest of the downloaded bytes.
        actual: Sha256Digest,
    },
}

/// One problem with one variant of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Formula name.
    pub package: String,
    /// Release version.
    pub version: String,
    /// Variant platform.
    pub platform: Platform,
    /// Variant url.
    pub url: String,
    /// The problem.
    pub kind: FindingKind,
}

impl Finding {
    /// Severity of the finding.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self.kind {
            FindingKind::Placeholder => Severity::Warning,
            FindingKind::FetchFailed { .. } | FindingKind::DigestMismatch { .. } => {
                Severity::Failure
            }
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity() {
            Severity::Warning => "warning",
            Severity::Failure => "FAILED",
        };
        write!(f, "{label}: {} {} {}: ", self.package, self.version, self.platform)?;
        match &self.kind {
            FindingKind::Placeholder => f.write_str("placeholder digest, release unpublished"),
            FindingKind::FetchFailed { reason } => write!(f, "could not fetch: {reason}"),
            FindingKind::DigestMismatch { actual } => {
                write!(f, "{} hashes to {actual}", self.url)
            }
        }
    }
}

/// Outcome of auditing a tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    /// Number of variants inspected.
    pub variants: usize,
    /// Number of artifacts downloaded and verified.
    pub verified: usize,
    /// Problems found, in tap order.
    pub findings: Vec<Finding>,
}

impl AuditReport {
    /// Whether no finding is a failure.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Findings that fail the audit.
    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity() == Severity::Failure)
    }

    /// Findings that are only warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity() == Severity::Warning)
    }
}

/// Audit every variant of every release in `tap`.
///
/// With a `fetcher`, each published artifact is downloaded once (no
/// retries) and its digest checked.
#[must_use]
pub fn audit_tap(tap: &Tap, fetcher: Option<&dyn ArtefactFetcher>) -> AuditReport {
    let mut report = AuditReport {
        variants: 0,
        verified: 0,
        findings: Vec::new(),
    };

    for formula in tap.formulas() {
        for release in &formula.releases {
            for variant in &release.platform_variants {
                report.variants += 1;
                let finding = |kind| Finding {
                    package: formula.name.clone(),
                    version: release.version.to_string(),
                    platform: variant.platform,
                    url: variant.url.clone(),
                    kind,
                };

                if variant.expected_digest.is_placeholder() {
                    report.findings.push(finding(FindingKind::Placeholder));
                    continue;
                }
                let Some(fetcher) = fetcher else {
                    continue;
                };

                debug!("auditing {}", variant.url);
                match fetcher.fetch(&variant.url) {
                    Err(e) => report.findings.push(finding(FindingKind::FetchFailed {
                        reason: e.to_string(),
                    })),
                    Ok(bytes) => match verify_bytes(&variant.expected_digest, &bytes) {
                        Ok(()) => report.verified += 1,
                        Err(VerifyError::Mismatch { actual, .. }) => report
                            .findings
                            .push(finding(FindingKind::DigestMismatch { actual })),
                        Err(VerifyError::Placeholder) => {
                            report.findings.push(finding(FindingKind::Placeholder));
                        }
                    },
                }
            }
        }
    }

    info!(
        "audited {} variant(s), verified {}, {} finding(s)",
        report.variants,
        report.verified,
        report.findings.len()
    );
    report
}
