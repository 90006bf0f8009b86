//! Install receipts.
//!
//! Each installed binary has a JSON receipt under
//! `<bin_dir>/.lm-tap/receipts/<binary>.json` recording which formula,
//! release and variant produced it. `list` and `uninstall` work from
//! receipts alone, so the binary directory itself is never scanned.

use crate::formula::descriptor::PlatformVariant;
use crate::formula::sha256_digest::Sha256Digest;
use crate::formula::version::ReleaseVersion;
use camino::{Utf8Path, Utf8PathBuf};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

/// Directory under the binary directory holding installer state.
pub const STATE_DIR: &str = ".lm-tap";

const RECEIPTS_DIR: &str = "receipts";
const RECEIPT_EXTENSION: &str = "json";

/// A binary placed on disk by the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledArtifact {
    /// Formula that installed the binary.
    pub package: String,
    /// Release version that was installed.
    pub version: ReleaseVersion,
    /// Absolute path of the executable.
    pub binary_path: Utf8PathBuf,
    /// The variant the bytes came from.
    pub source_variant: PlatformVariant,
    /// Digest of the downloaded artifact (equal to the formula digest).
    pub artifact_digest: Sha256Digest,
    /// Digest of the executable as written.
    pub binary_digest: Sha256Digest,
    /// Unix timestamp of the install, in seconds.
    pub installed_at: u64,
}

impl InstalledArtifact {
    /// Canonical binary name, taken from the installed path.
    #[must_use]
    pub fn binary_name(&self) -> &str {
        self.binary_path.file_name().unwrap_or_default()
    }
}

/// Reads and writes receipts for one binary directory.
#[derive(Debug, Clone)]
pub struct ReceiptStore {
    dir: Utf8PathBuf,
}

impl ReceiptStore {
    /// Receipt store belonging to `bin_dir`.
    #[must_use]
    pub fn new(bin_dir: &Utf8Path) -> Self {
        Self {
            dir: bin_dir.join(STATE_DIR).join(RECEIPTS_DIR),
        }
    }

    /// Directory the receipts live in.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Path of the receipt for `binary`.
    #[must_use]
    pub fn path_for(&self, binary: &str) -> Utf8PathBuf {
        self.dir.join(format!("{binary}.{RECEIPT_EXTENSION}"))
    }

    /// Write `artifact`'s receipt, replacing any previous one atomically.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the receipt cannot be serialized or written.
    pub fn write(&self, artifact: &InstalledArtifact) -> io::Result<Utf8PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(artifact.binary_name());
        let json = serde_json::to_vec_pretty(artifact).map_err(io::Error::other)?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(&json)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Read the receipt for `binary`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the receipt exists but cannot be read or
    /// parsed.
    pub fn read(&self, binary: &str) -> io::Result<Option<InstalledArtifact>> {
        let path = self.path_for(binary);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{path}: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the receipt for `binary`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the receipt exists but cannot be removed.
    pub fn remove(&self, binary: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(binary)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All readable receipts, ordered by binary name.
    ///
    /// Receipts that fail to parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the receipts directory exists but cannot be
    /// listed.
    pub fn list(&self) -> io::Result<Vec<InstalledArtifact>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut receipts = Vec::new();
        for entry in self.dir.read_dir_utf8()? {
            let path = entry?.into_path();
            if path.extension() != Some(RECEIPT_EXTENSION) {
                continue;
            }
            let parsed = fs::read(&path).and_then(|bytes| {
                serde_json::from_slice::<InstalledArtifact>(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            });
            match parsed {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => warn!("skipping unreadable receipt {path}: {e}"),
            }
        }
        receipts.sort_by(|a, b| a.binary_name().cmp(b.binary_name()));
        Ok(receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::platform::{Arch, Os, Platform};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        bin_dir: Utf8PathBuf,
    }

    #[fixture]
    fn store_dir() -> Fixture {
        let temp = tempfile::tempdir().expect("temp dir");
        let bin_dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("UTF-8");
        Fixture {
            _temp: temp,
            bin_dir,
        }
    }

    fn artifact(bin_dir: &Utf8Path, binary: &str, version: &str) -> InstalledArtifact {
        let digest = Sha256Digest::compute(binary.as_bytes());
        InstalledArtifact {
            package: "lm".to_owned(),
            version: version.parse().expect("valid version"),
            binary_path: bin_dir.join(binary),
            source_variant: PlatformVariant {
                platform: Platform::new(Os::Macos, Arch::Arm64),
                url: format!("https://example.test/v{version}/lm-darwin-arm64.tar.gz"),
                expected_digest: digest.clone(),
            },
            artifact_digest: digest.clone(),
            binary_digest: digest,
            installed_at: 1_700_000_000,
        }
    }

    #[rstest]
    fn write_then_read_returns_same_receipt(store_dir: Fixture) {
        let store = ReceiptStore::new(&store_dir.bin_dir);
        let receipt = artifact(&store_dir.bin_dir, "lm", "0.1.1");
        let path = store.write(&receipt).expect("write");
        assert!(path.ends_with(".lm-tap/receipts/lm.json"));
        assert_eq!(store.read("lm").expect("read"), Some(receipt));
    }

    #[rstest]
    fn rewrite_replaces_previous_receipt(store_dir: Fixture) {
        let store = ReceiptStore::new(&store_dir.bin_dir);
        store
            .write(&artifact(&store_dir.bin_dir, "lm", "0.1.1"))
            .expect("first write");
        store
            .write(&artifact(&store_dir.bin_dir, "lm", "0.1.3"))
            .expect("second write");
        let receipts = store.list().expect("list");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].version.to_string(), "0.1.3");
    }

    #[rstest]
    fn missing_receipt_reads_as_none(store_dir: Fixture) {
        let store = ReceiptStore::new(&store_dir.bin_dir);
        assert_eq!(store.read("lm").expect("read"), None);
        assert!(!store.remove("lm").expect("remove"));
        assert!(store.list().expect("list").is_empty());
    }

    #[rstest]
    fn list_skips_corrupt_receipts(store_dir: Fixture) {
        let store = ReceiptStore::new(&store_dir.bin_dir);
        store
            .write(&artifact(&store_dir.bin_dir, "lm", "0.1.1"))
            .expect("write");
        fs::write(store.path_for("broken"), b"{ not json").expect("write corrupt");

        let receipts = store.list().expect("list");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].binary_name(), "lm");
        assert!(store.read("broken").is_err());
    }

    #[rstest]
    fn remove_deletes_receipt(store_dir: Fixture) {
        let store = ReceiptStore::new(&store_dir.bin_dir);
        store
            .write(&artifact(&store_dir.bin_dir, "lm", "0.1.1"))
            .expect("write");
        assert!(store.remove("lm").expect("remove"));
        assert_eq!(store.read("lm").expect("read"), None);
    }
}
