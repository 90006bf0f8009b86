//! Turning verified artifact bytes into the executable to install.
//!
//! Release artifacts are either a raw executable or a `.tar.gz` archive
//! holding it. Archives are unpacked in memory with path traversal
//! protection; only the entry named after the binary is kept.

use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path};

/// Shape of the bytes served at a variant url.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// A gzip-compressed tarball containing the binary.
    TarGz,
    /// The executable itself.
    Raw,
}

impl ArtifactFormat {
    /// Infer the format from the url's file name.
    ///
    /// # Examples
    ///
    /// ```
    /// use lm_tap_installer::extraction::ArtifactFormat;
    ///
    /// assert_eq!(
    ///     ArtifactFormat::from_url("https://h.test/v0.1.1/lm-darwin-arm64.tar.gz"),
    ///     ArtifactFormat::TarGz
    /// );
    /// assert_eq!(ArtifactFormat::from_url("https://h.test/v0.1.1/lm"), ArtifactFormat::Raw);
    /// ```
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Raw
        }
    }
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error while decompressing or reading entries.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside its root.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive has no regular file named after the binary.
    #[error("archive does not contain an executable named {binary}")]
    BinaryNotFound {
        /// The binary name that was searched for.
        binary: String,
    },

    /// The archive names the binary more than once.
    #[error("archive contains more than one file named {binary}")]
    AmbiguousBinary {
        /// The duplicated binary name.
        binary: String,
    },
}

/// Return the executable bytes contained in a verified artifact.
///
/// # Errors
///
/// See [`extract_binary`] for archive failures. Raw artifacts never fail.
pub fn executable_payload(
    format: ArtifactFormat,
    artifact: &[u8],
    binary: &str,
) -> Result<Vec<u8>, ExtractionError> {
    match format {
        ArtifactFormat::TarGz => extract_binary(artifact, binary),
        ArtifactFormat::Raw => Ok(artifact.to_vec()),
    }
}

/// Find the regular file named `binary` in a `.tar.gz` archive.
///
/// The entry may sit at any depth (`lm` or `lm-darwin-arm64/lm`). Every
/// entry path is validated, even those that are skipped.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] if any entry is absolute or
/// contains `..`, [`ExtractionError::BinaryNotFound`] if no file matches,
/// [`ExtractionError::AmbiguousBinary`] if several match, and
/// [`ExtractionError::Io`] on decompression failures.
pub fn extract_binary(archive_bytes: &[u8], binary: &str) -> Result<Vec<u8>, ExtractionError> {
    let mut archive = tar::Archive::new(GzDecoder::new(archive_bytes));
    let mut found: Option<Vec<u8>> = None;

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;

        let is_match = entry.header().entry_type().is_file()
            && entry_path.file_name().and_then(|n| n.to_str()) == Some(binary);
        if !is_match {
            continue;
        }
        if found.is_some() {
            return Err(ExtractionError::AmbiguousBinary {
                binary: binary.to_owned(),
            });
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        found = Some(contents);
    }

    found.ok_or_else(|| ExtractionError::BinaryNotFound {
        binary: binary.to_owned(),
    })
}

/// Validate that a tar entry path does not escape the archive root via
/// `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    if path.is_absolute() || path.components().any(escapes_root) {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn escapes_root(component: Component<'_>) -> bool {
    matches!(
        component,
        Component::ParentDir | Component::RootDir | Component::Prefix(_)
    )
}
