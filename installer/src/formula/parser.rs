//! Formula TOML deserialization and ledger validation.
//!
//! Field-level validation (digests, platforms, versions) runs inside serde
//! through the newtypes' `TryFrom` impls. Cross-field rules run afterwards:
//! release ordering, one variant per platform, and url checks after
//! `{version}` expansion.

use super::descriptor::{Formula, PackageDescriptor, PlatformVariant, SmokeTestSpec};
use super::error::{FormulaError, Result};
use super::platform::Platform;
use super::sha256_digest::Sha256Digest;
use super::version::ReleaseVersion;
use log::trace;
use serde::Deserialize;
use std::collections::HashSet;

/// Placeholder expanded to the release version inside variant urls.
pub const VERSION_PLACEHOLDER: &str = "{version}";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFormula {
    name: String,
    description: String,
    homepage: String,
    binary: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    smoke_test: Option<RawSmokeTest>,
    #[serde(default, rename = "release")]
    releases: Vec<RawRelease>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSmokeTest {
    args: Option<Vec<String>>,
    expect: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelease {
    version: ReleaseVersion,
    #[serde(default, rename = "variant")]
    variants: Vec<RawVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVariant {
    os: super::platform::Os,
    arch: super::platform::Arch,
    url: String,
    sha256: Sha256Digest,
}

/// Parse and validate one formula file.
///
/// # Errors
///
/// Returns [`FormulaError::Syntax`] when the TOML is malformed or a field
/// fails newtype validation, and a specific [`FormulaError`] variant when a
/// ledger rule is broken.
///
/// # Examples
///
/// ```
/// use lm_tap_installer::formula::parser::parse_formula;
///
/// let toml = r#"
/// name = "lm"
/// description = "Lunch Money CLI"
/// homepage = "https://example.test"
///
/// [[release]]
/// version = "0.1.3"
///
/// [[release.variant]]
/// os = "macos"
/// arch = "arm64"
/// url = "https://example.test/v{version}/lm-darwin-arm64.tar.gz"
/// sha256 = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
/// "#;
/// let formula = parse_formula(toml).unwrap();
/// let release = formula.latest().unwrap();
/// assert_eq!(release.platform_variants[0].url, "https://example.test/v0.1.3/lm-darwin-arm64.tar.gz");
/// assert_eq!(release.binary, "lm");
/// ```
pub fn parse_formula(source: &str) -> Result<Formula> {
    let raw: RawFormula = toml::from_str(source).map_err(|e| FormulaError::Syntax {
        reason: e.to_string(),
    })?;
    validate(raw)
}

fn validate(raw: RawFormula) -> Result<Formula> {
    let name = required("name", &raw.name)?;
    let description = required("description", &raw.description)?;
    let homepage = required("homepage", &raw.homepage)?;
    let binary = match raw.binary {
        Some(binary) => required("binary", &binary)?,
        None => name.clone(),
    };
    validate_binary_name(&binary)?;

    let aliases = raw
        .aliases
        .into_iter()
        .map(|alias| required("aliases", &alias))
        .collect::<Result<Vec<_>>>()?;

    let smoke_test = smoke_test_from(raw.smoke_test)?;

    if raw.releases.is_empty() {
        return Err(FormulaError::NoReleases { name });
    }

    let mut releases: Vec<PackageDescriptor> = Vec::with_capacity(raw.releases.len());
    for raw_release in raw.releases {
        if let Some(previous) = releases.last()
            && previous.version >= raw_release.version
        {
            return Err(FormulaError::ReleaseOrder {
                previous: previous.version.to_string(),
                next: raw_release.version.to_string(),
            });
        }
        let platform_variants = validate_variants(&raw_release.version, raw_release.variants)?;
        trace!(
            "parsed {name} {} with {} variant(s)",
            raw_release.version,
            platform_variants.len()
        );
        releases.push(PackageDescriptor {
            name: name.clone(),
            binary: binary.clone(),
            version: raw_release.version,
            platform_variants,
            smoke_test: smoke_test.clone(),
        });
    }

    Ok(Formula {
        name,
        description,
        homepage,
        binary,
        aliases,
        releases,
    })
}

fn validate_variants(
    version: &ReleaseVersion,
    raw_variants: Vec<RawVariant>,
) -> Result<Vec<PlatformVariant>> {
    if raw_variants.is_empty() {
        return Err(FormulaError::NoVariants {
            version: version.to_string(),
        });
    }

    let mut seen: HashSet<Platform> = HashSet::new();
    raw_variants
        .into_iter()
        .map(|raw| {
            let platform = Platform::new(raw.os, raw.arch);
            if !seen.insert(platform) {
                return Err(FormulaError::DuplicateVariant {
                    version: version.to_string(),
                    platform: platform.to_string(),
                });
            }
            Ok(PlatformVariant {
                platform,
                url: expand_url(&raw.url, version)?,
                expected_digest: raw.sha256,
            })
        })
        .collect()
}

/// Expand `{version}` in `template` and check the result is a usable url.
///
/// The expanded url must use `https` and must contain the release version,
/// so that two releases can never share one download location.
///
/// # Errors
///
/// Returns [`FormulaError::InvalidUrl`] when either rule is broken.
pub fn expand_url(template: &str, version: &ReleaseVersion) -> Result<String> {
    let rendered = version.to_string();
    let url = template.trim().replace(VERSION_PLACEHOLDER, &rendered);
    let invalid = |reason: &str| FormulaError::InvalidUrl {
        url: url.clone(),
        version: rendered.clone(),
        reason: reason.to_owned(),
    };

    let Some(rest) = url.strip_prefix("https://") else {
        return Err(invalid("artifacts must be fetched over https"));
    };
    if rest.is_empty() || rest.starts_with('/') {
        return Err(invalid("missing host"));
    }
    if !url.contains(&rendered) {
        return Err(invalid("url must embed the release version"));
    }
    Ok(url)
}

fn smoke_test_from(raw: Option<RawSmokeTest>) -> Result<SmokeTestSpec> {
    let defaults = SmokeTestSpec::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };
    let expect = match raw.expect {
        Some(expect) => required("smoke_test.expect", &expect)?,
        None => defaults.expect,
    };
    Ok(SmokeTestSpec {
        args: raw.args.unwrap_or(defaults.args),
        expect,
    })
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FormulaError::EmptyField { field });
    }
    Ok(trimmed.to_owned())
}

fn validate_binary_name(binary: &str) -> Result<()> {
    let invalid = binary == "."
        || binary == ".."
        || binary.starts_with('.')
        || binary.contains(['/', '\\']);
    if invalid {
        return Err(FormulaError::InvalidBinaryName {
            value: binary.to_owned(),
        });
    }
    Ok(())
}
