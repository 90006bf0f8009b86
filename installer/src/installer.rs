//! Placing verified executables into the binary directory.
//!
//! Writes go to a temporary file in the binary directory and are renamed
//! over the destination, so a reader sees either the old binary or the new
//! one. Installs of the same binary serialize on an exclusive lock file.

use crate::error::InstallerError;
use crate::extraction::ExtractionError;
use crate::formula::descriptor::{PackageDescriptor, PlatformVariant};
use crate::formula::sha256_digest::Sha256Digest;
use crate::receipt::{InstalledArtifact, ReceiptStore, STATE_DIR};
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

const LOCKS_DIR: &str = "locks";
const TEMP_PREFIX: &str = ".lm-tap-";

/// Mode given to installed executables.
#[cfg(unix)]
const EXECUTABLE_MODE: u32 = 0o755;

/// Errors arising while placing or removing a binary.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The binary directory cannot be created or written to.
    #[error("{path} is not writable: {source}")]
    NotWritable {
        /// The binary directory.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// The install lock could not be acquired.
    #[error("failed to lock {path}: {source}")]
    Lock {
        /// The lock file.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// The artifact did not yield an executable.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Writing the executable failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The destination path.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// Recording or removing the receipt failed.
    #[error("failed to update receipt for {binary}: {source}")]
    Receipt {
        /// The binary the receipt belongs to.
        binary: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// Removing the executable failed.
    #[error("failed to remove {path}: {source}")]
    Remove {
        /// The executable path.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Exclusive hold on one binary name in one binary directory.
///
/// The lock is released when the guard is dropped. The lock file itself is
/// left in place so that waiting processes keep contending on the same
/// inode.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: Utf8PathBuf,
}

impl InstallLock {
    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("failed to release {}: {e}", self.path);
        }
    }
}

/// Everything needed to put one executable on disk.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    /// The release being installed.
    pub descriptor: &'a PackageDescriptor,
    /// The variant the artifact was fetched from.
    pub variant: &'a PlatformVariant,
    /// The executable bytes, already extracted from the artifact.
    pub executable: &'a [u8],
}

/// Installs executables into one binary directory.
#[derive(Debug, Clone)]
pub struct Installer {
    bin_dir: Utf8PathBuf,
    receipts: ReceiptStore,
}

impl Installer {
    /// Create an installer for `bin_dir`, which must already be absolute.
    #[must_use]
    pub fn new(bin_dir: Utf8PathBuf) -> Self {
        let receipts = ReceiptStore::new(&bin_dir);
        Self { bin_dir, receipts }
    }

    /// Create an installer for a user-supplied `bin_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidBinDir`] if `bin_dir` is empty or
    /// cannot be made absolute.
    pub fn open(bin_dir: &Utf8Path) -> Result<Self, InstallerError> {
        absolute_bin_dir(bin_dir).map(Self::new)
    }

    /// The binary directory.
    #[must_use]
    pub fn bin_dir(&self) -> &Utf8Path {
        &self.bin_dir
    }

    /// The receipt store for the binary directory.
    #[must_use]
    pub fn receipts(&self) -> &ReceiptStore {
        &self.receipts
    }

    /// Where `binary` is installed.
    #[must_use]
    pub fn binary_path(&self, binary: &str) -> Utf8PathBuf {
        self.bin_dir.join(binary)
    }

    /// Ensure the binary directory exists and is writable.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::NotWritable`] if the directory cannot be
    /// created or a file cannot be created inside it.
    pub fn prepare(&self) -> Result<(), InstallError> {
        let not_writable = |source| InstallError::NotWritable {
            path: self.bin_dir.clone(),
            source,
        };
        fs::create_dir_all(&self.bin_dir).map_err(not_writable)?;
        // The scratch file is deleted when dropped.
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.bin_dir)
            .map_err(not_writable)?;
        Ok(())
    }

    /// Block until this process holds the install lock for `binary`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Lock`] if the lock file cannot be created or
    /// locked.
    pub fn lock(&self, binary: &str) -> Result<InstallLock, InstallError> {
        let dir = self.bin_dir.join(STATE_DIR).join(LOCKS_DIR);
        let path = dir.join(format!("{binary}.lock"));
        let lock_error = |source| InstallError::Lock {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&dir).map_err(lock_error)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_error)?;
        debug!("waiting for {path}");
        file.lock_exclusive().map_err(lock_error)?;
        debug!("acquired {path}");
        Ok(InstallLock { file, path })
    }

    /// Atomically write the executable and its receipt.
    ///
    /// The caller must hold the lock for the descriptor's binary. Installing
    /// the same release twice leaves the same end state.
    ///
    /// # Errors
    ///
    /// Returns an [`InstallError`] if the directory is not writable, the
    /// file cannot be written or renamed, or the receipt cannot be stored.
    pub fn install(
        &self,
        _lock: &InstallLock,
        request: &InstallRequest<'_>,
    ) -> Result<InstalledArtifact, InstallError> {
        let descriptor = request.descriptor;
        self.prepare()?;
        let destination = self.binary_path(&descriptor.binary);
        self.write_executable(&destination, request.executable)?;
        debug!("placed {destination}");

        let artifact = InstalledArtifact {
            package: descriptor.name.clone(),
            version: descriptor.version.clone(),
            binary_path: destination,
            source_variant: request.variant.clone(),
            artifact_digest: request.variant.expected_digest.clone(),
            binary_digest: Sha256Digest::compute(request.executable),
            installed_at: unix_now(),
        };
        self.receipts
            .write(&artifact)
            .map_err(|source| InstallError::Receipt {
                binary: descriptor.binary.clone(),
                source,
            })?;
        Ok(artifact)
    }

    /// Remove `binary` and its receipt.
    ///
    /// Returns the receipt that was removed, or `None` if the installer has
    /// no record of the binary (in which case nothing is touched).
    ///
    /// # Errors
    ///
    /// Returns an [`InstallError`] if the lock, the executable or the
    /// receipt cannot be handled.
    pub fn uninstall(&self, binary: &str) -> Result<Option<InstalledArtifact>, InstallError> {
        let _lock = self.lock(binary)?;
        let receipt_error = |source| InstallError::Receipt {
            binary: binary.to_owned(),
            source,
        };
        let Some(receipt) = self.receipts.read(binary).map_err(receipt_error)? else {
            return Ok(None);
        };

        let path = self.binary_path(binary);
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed {path}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => debug!("{path} was already gone"),
            Err(source) => return Err(InstallError::Remove { path, source }),
        }
        self.receipts.remove(binary).map_err(receipt_error)?;
        Ok(Some(receipt))
    }

    fn write_executable(&self, destination: &Utf8Path, bytes: &[u8]) -> Result<(), InstallError> {
        let write_error = |source| InstallError::Write {
            path: destination.to_owned(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.bin_dir)
            .map_err(write_error)?;
        temp.write_all(bytes).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        set_executable(temp.as_file()).map_err(write_error)?;

        // Dropping the handle closes it before anyone execs the new file.
        let file = temp.persist(destination).map_err(|e| write_error(e.error))?;
        drop(file);
        Ok(())
    }
}

/// Reject an empty `dir` and resolve a relative one against the current
/// directory.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidBinDir`] if `dir` is empty, the current
/// directory is unavailable, or the result is not UTF-8.
pub fn absolute_bin_dir(dir: &Utf8Path) -> Result<Utf8PathBuf, InstallerError> {
    let invalid = |reason: String| InstallerError::InvalidBinDir {
        path: dir.to_owned(),
        reason,
    };
    if dir.as_str().trim().is_empty() {
        return Err(invalid("the path is empty".to_owned()));
    }
    let absolute = std::path::absolute(dir).map_err(|source| invalid(source.to_string()))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|p| invalid(format!("{} is not valid UTF-8", p.display())))
}

#[cfg(unix)]
fn set_executable(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    file.set_permissions(fs::Permissions::from_mode(EXECUTABLE_MODE))
}

#[cfg(not(unix))]
fn set_executable(_file: &File) -> io::Result<()> {
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
