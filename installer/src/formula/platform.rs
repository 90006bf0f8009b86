//! Operating system and CPU architecture matrix for platform variants.
//!
//! Formulas only publish macOS builds for two architectures. Formula
//! records name them `macos` with `arm64`/`amd64`; the Homebrew-style
//! spellings (`darwin`, `aarch64`, `x86_64`, `intel`) are accepted as
//! aliases and normalised on parse.

use super::error::{FormulaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating systems a variant may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Os {
    /// Apple macOS.
    Macos,
}

impl Os {
    const ACCEPTED: &'static str = "macos";

    /// Return the canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Macos => "macos",
        }
    }
}

impl TryFrom<&str> for Os {
    type Error = FormulaError;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Self::Macos),
            _ => Err(FormulaError::UnsupportedOs {
                value: value.to_owned(),
                expected: Self::ACCEPTED.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for Os {
    type Error = FormulaError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<Os> for String {
    fn from(os: Os) -> Self {
        os.as_str().to_owned()
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architectures a variant may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
    /// 64-bit ARM (Apple silicon).
    Arm64,
    /// 64-bit x86 (Intel).
    Amd64,
}

impl Arch {
    const ACCEPTED: &'static str = "arm64, amd64";

    /// Return the canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::Amd64 => "amd64",
        }
    }
}

impl TryFrom<&str> for Arch {
    type Error = FormulaError;

    fn try_from(value: &str) -> Result<Self> {
        match normalise_arch(value).as_str() {
            "arm64" => Ok(Self::Arm64),
            "amd64" => Ok(Self::Amd64),
            _ => Err(FormulaError::UnsupportedArch {
                value: value.to_owned(),
                expected: Self::ACCEPTED.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for Arch {
    type Error = FormulaError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<Arch> for String {
    fn from(arch: Arch) -> Self {
        arch.as_str().to_owned()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `(os, arch)` pair published by a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    /// Target operating system.
    pub os: Os,
    /// Target CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a platform pair.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// The platform the installer runs on.
///
/// Unlike [`Platform`] this accepts any operating system or architecture,
/// because an unsupported host is a resolution failure rather than a parse
/// failure.
///
/// # Examples
///
/// ```
/// use lm_tap_installer::formula::platform::{Arch, HostPlatform, Os, Platform};
///
/// let host = HostPlatform::new("macos", "aarch64");
/// assert!(host.matches(Platform::new(Os::Macos, Arch::Arm64)));
/// assert!(!host.matches(Platform::new(Os::Macos, Arch::Amd64)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPlatform {
    os: String,
    arch: String,
}

impl HostPlatform {
    /// Describe a host from raw OS and architecture names.
    #[must_use]
    pub fn new(os: &str, arch: &str) -> Self {
        let os = match Os::try_from(os) {
            Ok(known) => known.as_str().to_owned(),
            Err(_) => os.trim().to_ascii_lowercase(),
        };
        Self {
            os,
            arch: normalise_arch(arch),
        }
    }

    /// Detect the platform this binary was compiled for.
    #[must_use]
    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Return the normalised operating system name.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Return the normalised architecture name.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Whether a published platform runs on this host.
    #[must_use]
    pub fn matches(&self, platform: Platform) -> bool {
        self.os == platform.os.as_str() && self.arch == platform.arch.as_str()
    }
}

impl From<Platform> for HostPlatform {
    fn from(platform: Platform) -> Self {
        Self {
            os: platform.os.as_str().to_owned(),
            arch: platform.arch.as_str().to_owned(),
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

fn normalise_arch(value: &str) -> String {
    let lower = value.trim().to_ascii_lowercase();
    match lower.as_str() {
        "arm64" | "aarch64" => "arm64".to_owned(),
        "amd64" | "x86_64" | "x86-64" | "intel" => "amd64".to_owned(),
        _ => lower,
    }
}
