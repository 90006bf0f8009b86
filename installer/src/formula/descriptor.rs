//! Validated descriptor types: one [`Formula`] per package name, holding an
//! append-only ledger of [`PackageDescriptor`] releases.
//!
//! Values in this module are only produced by
//! [`parse_formula`](super::parser::parse_formula), so every instance already
//! satisfies the ledger invariants (ordered unique versions, one variant per
//! platform, version-bearing https urls).

use super::platform::{HostPlatform, Platform};
use super::sha256_digest::Sha256Digest;
use super::version::ReleaseVersion;
use serde::{Deserialize, Serialize};

/// Default arguments passed to the installed binary by the smoke test.
pub const DEFAULT_SMOKE_ARGS: &[&str] = &["--help"];

/// Default substring the smoke test expects in the binary's output.
pub const DEFAULT_SMOKE_EXPECT: &str = "Lunch Money CLI";

/// One downloadable build of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVariant {
    /// The `(os, arch)` pair this build runs on.
    pub platform: Platform,
    /// Download location, with `{version}` already expanded.
    pub url: String,
    /// SHA-256 of the bytes served at `url`.
    pub expected_digest: Sha256Digest,
}

/// How to confirm an installed binary actually works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeTestSpec {
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Substring that must appear in combined stdout and stderr.
    pub expect: String,
}

impl Default for SmokeTestSpec {
    fn default() -> Self {
        Self {
            args: DEFAULT_SMOKE_ARGS.iter().map(|&a| a.to_owned()).collect(),
            expect: DEFAULT_SMOKE_EXPECT.to_owned(),
        }
    }
}

/// One immutable release of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    /// Formula name the release was published under.
    pub name: String,
    /// Canonical name of the installed executable.
    pub binary: String,
    /// Release version.
    pub version: ReleaseVersion,
    /// Builds in formula order.
    pub platform_variants: Vec<PlatformVariant>,
    /// Post-install check.
    pub smoke_test: SmokeTestSpec,
}

impl PackageDescriptor {
    /// Return the variant that runs on `host`, if any.
    #[must_use]
    pub fn variant_for(&self, host: &HostPlatform) -> Option<&PlatformVariant> {
        self.platform_variants
            .iter()
            .find(|variant| host.matches(variant.platform))
    }
}

/// The release ledger for one package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Formula {
    /// Formula name.
    pub name: String,
    /// One-line summary.
    pub description: String,
    /// Project home page.
    pub homepage: String,
    /// Canonical name of the installed executable.
    pub binary: String,
    /// Additional names that resolve to this formula.
    pub aliases: Vec<String>,
    /// Releases in strictly increasing version order.
    pub releases: Vec<PackageDescriptor>,
}

impl Formula {
    /// Return the release with exactly this version.
    #[must_use]
    pub fn release(&self, version: &ReleaseVersion) -> Option<&PackageDescriptor> {
        self.releases
            .iter()
            .find(|release| &release.version == version)
    }

    /// Return the newest release.
    #[must_use]
    pub fn latest(&self) -> Option<&PackageDescriptor> {
        self.releases.last()
    }

    /// Iterate over every name this formula answers to.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}
