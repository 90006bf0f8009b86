//! Error types for formula parsing and descriptor validation.
//!
//! Each variant names the offending value and the constraint it broke, so a
//! malformed formula file can be fixed from the message alone.

use thiserror::Error;

/// Errors arising from invalid formula records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// The formula file is not valid TOML or does not match the schema.
    #[error("invalid formula syntax: {reason}")]
    Syntax {
        /// Parser message, including the location when available.
        reason: String,
    },

    /// A formula file could not be read from disk.
    #[error("failed to read formula {path}: {reason}")]
    Read {
        /// Path of the unreadable file.
        path: String,
        /// Underlying I/O error message.
        reason: String,
    },

    /// A required text field is empty or blank.
    #[error("formula field `{field}` must not be empty")]
    EmptyField {
        /// Name of the blank field.
        field: &'static str,
    },

    /// The binary name is not a plain file name.
    #[error("invalid binary name \"{value}\": must be a plain file name")]
    InvalidBinaryName {
        /// The rejected binary name.
        value: String,
    },

    /// A release version is not a `major.minor.patch` triple.
    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected version string.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The operating system is not part of the supported matrix.
    #[error("unsupported operating system \"{value}\"; expected one of: {expected}")]
    UnsupportedOs {
        /// The rejected operating system name.
        value: String,
        /// Comma-separated list of accepted names.
        expected: String,
    },

    /// The CPU architecture is not part of the supported matrix.
    #[error("unsupported architecture \"{value}\"; expected one of: {expected}")]
    UnsupportedArch {
        /// The rejected architecture name.
        value: String,
        /// Comma-separated list of accepted names.
        expected: String,
    },

    /// A SHA-256 digest is not a valid 64-character hex string.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidSha256Digest {
        /// Description of the validation failure.
        reason: String,
    },

    /// A download URL is not usable for the release it belongs to.
    #[error("invalid url \"{url}\" for version {version}: {reason}")]
    InvalidUrl {
        /// The url after `{version}` expansion.
        url: String,
        /// The release version the url belongs to.
        version: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// A formula declares no releases.
    #[error("formula {name} declares no releases")]
    NoReleases {
        /// Name of the formula.
        name: String,
    },

    /// A release declares no platform variants.
    #[error("release {version} declares no platform variants")]
    NoVariants {
        /// The release version.
        version: String,
    },

    /// Two variants of one release target the same platform.
    #[error("release {version} declares more than one variant for {platform}")]
    DuplicateVariant {
        /// The release version.
        version: String,
        /// The duplicated `(os, arch)` pair.
        platform: String,
    },

    /// Releases are not listed in strictly increasing version order.
    #[error("release {next} must be newer than the preceding release {previous}")]
    ReleaseOrder {
        /// The release listed first.
        previous: String,
        /// The release listed after it.
        next: String,
    },

    /// Two formulas in one tap claim the same name or alias.
    #[error("package name {name} is declared by more than one formula")]
    DuplicatePackage {
        /// The contested name.
        name: String,
    },
}

/// Result type alias using [`FormulaError`].
pub type Result<T> = std::result::Result<T, FormulaError>;
