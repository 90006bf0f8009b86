//! Integrity gate between fetching and installing.
//!
//! Computes SHA-256 over the complete downloaded byte stream and compares
//! it with the digest recorded in the formula. Nothing is written to the
//! binary directory unless [`verify_bytes`] returns `Ok`.

use crate::formula::sha256_digest::Sha256Digest;

/// Why an artifact failed verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// The formula digest is the unpublished all-zero sentinel.
    #[error("placeholder digest; the artifact was never published")]
    Placeholder,

    /// The bytes hash to a different digest.
    #[error("expected {expected}, got {actual}")]
    Mismatch {
        /// Digest recorded in the formula.
        expected: Sha256Digest,
        /// Digest of the bytes.
        actual: Sha256Digest,
    },
}

/// Reject the placeholder digest before any download is attempted.
///
/// # Errors
///
/// Returns [`VerifyError::Placeholder`] for the all-zero digest.
pub fn ensure_published(expected: &Sha256Digest) -> Result<(), VerifyError> {
    if expected.is_placeholder() {
        return Err(VerifyError::Placeholder);
    }
    Ok(())
}

/// Verify that `bytes` hash to `expected`.
///
/// # Errors
///
/// Returns [`VerifyError::Placeholder`] if `expected` is the unpublished
/// sentinel and [`VerifyError::Mismatch`] if the digests differ.
///
/// # Examples
///
/// ```
/// use lm_tap_installer::formula::sha256_digest::Sha256Digest;
/// use lm_tap_installer::verify::verify_bytes;
///
/// let payload = b"lm binary";
/// let expected = Sha256Digest::compute(payload);
/// assert!(verify_bytes(&expected, payload).is_ok());
/// assert!(verify_bytes(&expected, b"lm binarY").is_err());
/// ```
pub fn verify_bytes(expected: &Sha256Digest, bytes: &[u8]) -> Result<(), VerifyError> {
    ensure_published(expected)?;
    let actual = Sha256Digest::compute(bytes);
    if &actual != expected {
        return Err(VerifyError::Mismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}
