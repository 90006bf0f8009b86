//! Output formatting for the installer CLI.
//!
//! Progress and diagnostics go to stderr through [`write_stderr_line`];
//! command results (`list`, `info`, `audit`) are rendered to strings here and
//! written to stdout by the binary, either as aligned text or as JSON.

use crate::audit::AuditReport;
use crate::formula::descriptor::{Formula, PlatformVariant};
use crate::formula::platform::HostPlatform;
use crate::pipeline::InstallOutcome;
use crate::receipt::InstalledArtifact;
use serde::Serialize;
use std::fmt;
use std::io::Write;

/// Write one line to `stderr`, ignoring failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Format the message printed after a successful install.
///
/// # Example
///
/// ```
/// # use lm_tap_installer::output::success_message;
/// # fn demo(outcome: &lm_tap_installer::pipeline::InstallOutcome) {
/// let message = success_message(outcome);
/// assert!(message.starts_with("Installed lm"));
/// # }
/// ```
#[must_use]
pub fn success_message(outcome: &InstallOutcome) -> String {
    let artifact = &outcome.artifact;
    let smoke = if outcome.smoke.is_some() {
        "smoke test passed"
    } else {
        "smoke test skipped"
    };
    format!(
        "Installed {} {} ({}) to {}; {smoke}",
        artifact.package, artifact.version, artifact.source_variant.platform, artifact.binary_path
    )
}

/// Render installed packages as aligned text.
#[must_use]
pub fn format_installed(receipts: &[InstalledArtifact]) -> String {
    if receipts.is_empty() {
        return "No packages installed.".to_owned();
    }
    InstalledTable(receipts).to_string()
}

struct InstalledTable<'a>(&'a [InstalledArtifact]);

impl fmt::Display for InstalledTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let receipts = self.0;
        let name_width = receipts
            .iter()
            .map(|r| r.binary_name().len())
            .max()
            .unwrap_or_default();
        for (index, receipt) in receipts.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(
                f,
                "{:name_width$}  {:8}  {:12}  {}  (from {})",
                receipt.binary_name(),
                receipt.version.to_string(),
                receipt.source_variant.platform.to_string(),
                receipt.binary_path,
                receipt.package,
            )?;
        }
        Ok(())
    }
}

/// Render installed packages as JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn format_installed_json(receipts: &[InstalledArtifact]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(receipts)
}

#[derive(Debug, Serialize)]
struct InfoJson<'a> {
    #[serde(flatten)]
    formula: &'a Formula,
    host: String,
    selected: Option<&'a PlatformVariant>,
    installed: Option<&'a InstalledArtifact>,
}

/// Everything `info` reports about one formula.
#[derive(Debug, Clone, Copy)]
pub struct PackageInfo<'a> {
    /// The formula being described.
    pub formula: &'a Formula,
    /// The host the selection is made for.
    pub host: &'a HostPlatform,
    /// The receipt for the formula's binary, if installed.
    pub installed: Option<&'a InstalledArtifact>,
}

impl PackageInfo<'_> {
    fn selected(&self) -> Option<&PlatformVariant> {
        self.formula
            .latest()
            .and_then(|release| release.variant_for(self.host))
    }

    /// Render as human-readable text.
    #[must_use]
    pub fn display_text(&self) -> String {
        self.to_string()
    }

    /// Render as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&InfoJson {
            formula: self.formula,
            host: self.host.to_string(),
            selected: self.selected(),
            installed: self.installed,
        })
    }
}

impl fmt::Display for PackageInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formula = self.formula;
        writeln!(f, "{}: {}", formula.name, formula.description)?;
        writeln!(f, "{}", formula.homepage)?;
        writeln!(f, "Binary: {}", formula.binary)?;
        if !formula.aliases.is_empty() {
            writeln!(f, "Aliases: {}", formula.aliases.join(", "))?;
        }

        f.write_str("\nReleases:\n")?;
        for release in formula.releases.iter().rev() {
            for variant in &release.platform_variants {
                let status = if variant.expected_digest.is_placeholder() {
                    "unpublished"
                } else {
                    "published"
                };
                writeln!(
                    f,
                    "  {:8}  {:12}  {status:11}  {}",
                    release.version.to_string(),
                    variant.platform.to_string(),
                    variant.url
                )?;
            }
        }

        let selected = self
            .selected()
            .map_or_else(|| "no compatible build".to_owned(), |v| v.url.clone());
        writeln!(f, "\nThis machine ({}): {selected}", self.host)?;
        match self.installed {
            Some(receipt) => write!(
                f,
                "Installed: {} at {} (from {})",
                receipt.version, receipt.binary_path, receipt.package
            ),
            None => f.write_str("Installed: no"),
        }
    }
}

/// Render an audit report as text.
#[must_use]
pub fn format_audit(report: &AuditReport) -> String {
    AuditText(report).to_string()
}

struct AuditText<'a>(&'a AuditReport);

impl fmt::Display for AuditText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        write!(
            f,
            "Audited {} variant(s); {} artifact(s) downloaded and verified.",
            report.variants, report.verified
        )?;
        for finding in &report.findings {
            write!(f, "\n  {finding}")?;
        }
        let verdict = if report.is_clean() { "OK" } else { "FAILED" };
        write!(f, "\n{verdict}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::audit_tap;
    use crate::formula::sha256_digest::Sha256Digest;
    use crate::formula::tap::Tap;
    use crate::test_utils::arm_host;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};

    #[fixture]
    fn tap() -> Tap {
        Tap::builtin().expect("bundled formulas")
    }

    fn receipt(tap: &Tap) -> InstalledArtifact {
        let resolution = tap.resolve("lm", None, &arm_host()).expect("resolves");
        InstalledArtifact {
            package: "lm".to_owned(),
            version: resolution.descriptor.version.clone(),
            binary_path: Utf8PathBuf::from("/home/test/.local/bin/lm"),
            source_variant: resolution.variant.clone(),
            artifact_digest: resolution.variant.expected_digest.clone(),
            binary_digest: Sha256Digest::compute(b"lm"),
            installed_at: 1_700_000_000,
        }
    }

    #[rstest]
    fn success_message_names_package_and_path(tap: Tap) {
        let outcome = InstallOutcome {
            artifact: receipt(&tap),
            smoke: None,
        };
        let message = success_message(&outcome);
        assert_eq!(
            message,
            "Installed lm 0.1.1 (macos/arm64) to /home/test/.local/bin/lm; smoke test skipped"
        );
    }

    #[test]
    fn empty_list_says_so() {
        assert_eq!(format_installed(&[]), "No packages installed.");
    }

    #[rstest]
    fn list_shows_one_line_per_receipt(tap: Tap) {
        let text = format_installed(&[receipt(&tap)]);
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("lm  0.1.1"), "{text}");
        assert!(text.ends_with("(from lm)"), "{text}");
    }

    #[rstest]
    fn list_aligns_names_without_trailing_newline(tap: Tap) {
        let first = receipt(&tap);
        let second = InstalledArtifact {
            binary_path: Utf8PathBuf::from("/opt/bin/lm-nightly"),
            ..first.clone()
        };
        let text = format_installed(&[first, second]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2, "{text}");
        assert!(text.starts_with("lm          0.1.1"), "{text}");
        assert!(text.contains("\nlm-nightly  0.1.1"), "{text}");
        assert!(!text.ends_with('\n'));
    }

    #[rstest]
    fn list_json_round_trips(tap: Tap) {
        let receipts = vec![receipt(&tap)];
        let json = format_installed_json(&receipts).expect("serializes");
        let parsed: Vec<InstalledArtifact> = serde_json::from_str(&json).expect("parses");
        assert_eq!(parsed, receipts);
    }

    #[rstest]
    fn info_text_shows_selection_and_status(tap: Tap) {
        let formula = tap.formula("lunchmoney-cli").expect("formula");
        let host = arm_host();
        let info = PackageInfo {
            formula,
            host: &host,
            installed: None,
        };
        let text = info.display_text();
        assert!(text.contains("unpublished"), "{text}");
        assert!(text.contains("This machine (macos/arm64): https://"), "{text}");
        assert!(text.starts_with("lunchmoney-cli: "), "{text}");
        assert!(text.contains("\nReleases:\n  0.0.0   "), "{text}");
        assert!(text.ends_with("Installed: no"), "{text}");
    }

    #[rstest]
    fn info_json_carries_selected_variant(tap: Tap) {
        let installed = receipt(&tap);
        let host = HostPlatform::new("macos", "x86_64");
        let info = PackageInfo {
            formula: tap.formula("lm").expect("formula"),
            host: &host,
            installed: Some(&installed),
        };
        let value: serde_json::Value =
            serde_json::from_str(&info.json().expect("serializes")).expect("valid JSON");
        assert_eq!(value["name"], "lm");
        assert_eq!(value["host"], "macos/amd64");
        assert_eq!(value["selected"]["platform"]["arch"], "amd64");
        assert_eq!(value["installed"]["package"], "lm");
    }

    #[rstest]
    fn info_reports_unsupported_host(tap: Tap) {
        let host = HostPlatform::new("linux", "x86_64");
        let info = PackageInfo {
            formula: tap.formula("lm").expect("formula"),
            host: &host,
            installed: None,
        };
        assert!(info.display_text().contains("no compatible build"));
    }

    #[rstest]
    fn audit_text_lists_findings_and_verdict(tap: Tap) {
        let text = format_audit(&audit_tap(&tap, None));
        assert!(
            text.starts_with("Audited 4 variant(s); 0 artifact(s) downloaded and verified.\n"),
            "{text}"
        );
        assert!(text.contains("warning: lunchmoney-cli 0.0.0"), "{text}");
        assert!(text.ends_with("OK"), "{text}");
    }
}
