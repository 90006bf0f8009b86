//! Release version newtype.
//!
//! Formula releases are pinned to plain `major.minor.patch` triples.
//! Pre-release and build metadata are rejected so that the ledger order is
//! exactly the numeric order of the triples.

use super::error::{FormulaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated `major.minor.patch` release version.
///
/// # Examples
///
/// ```
/// use lm_tap_installer::formula::version::ReleaseVersion;
///
/// let older: ReleaseVersion = "0.1.2".parse().unwrap();
/// let newer: ReleaseVersion = "0.1.10".parse().unwrap();
/// assert!(older < newer);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseVersion(semver::Version);

impl ReleaseVersion {
    /// Return the underlying semantic version.
    #[must_use]
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl FromStr for ReleaseVersion {
    type Err = FormulaError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FormulaError::InvalidVersion {
                value: value.to_owned(),
                reason: "version must not be empty".to_owned(),
            });
        }
        let parsed = semver::Version::parse(trimmed).map_err(|e| FormulaError::InvalidVersion {
            value: value.to_owned(),
            reason: e.to_string(),
        })?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(FormulaError::InvalidVersion {
                value: value.to_owned(),
                reason: "expected a plain major.minor.patch triple".to_owned(),
            });
        }
        Ok(Self(parsed))
    }
}

impl TryFrom<String> for ReleaseVersion {
    type Error = FormulaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ReleaseVersion> for String {
    fn from(version: ReleaseVersion) -> Self {
        version.0.to_string()
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
