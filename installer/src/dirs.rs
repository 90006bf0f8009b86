//! Directory resolution abstraction for platform-specific paths.
//!
//! The installer needs a default binary directory and a location for its
//! configuration file. Both come from the platform conventions exposed by
//! `directories-next`; the [`BaseDirs`] trait lets tests substitute their
//! own locations.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Source of per-user base directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Directory for user executables.
    fn bin_dir(&self) -> Option<PathBuf>;

    /// Directory holding the installer's configuration.
    fn config_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the operating system's conventions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    /// `$XDG_BIN_HOME` style location where the platform has one, otherwise
    /// `~/.local/bin`.
    fn bin_dir(&self) -> Option<PathBuf> {
        let dirs = directories_next::BaseDirs::new()?;
        dirs.executable_dir()
            .map(std::path::Path::to_path_buf)
            .or_else(|| Some(dirs.home_dir().join(".local").join("bin")))
    }

    fn config_dir(&self) -> Option<PathBuf> {
        directories_next::ProjectDirs::from("", "", "lm-tap")
            .map(|project| project.config_dir().to_path_buf())
    }
}

/// Default binary directory as a UTF-8 path.
#[must_use]
pub fn default_bin_dir(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    dirs.bin_dir().and_then(|p| Utf8PathBuf::try_from(p).ok())
}

/// Default configuration file path as a UTF-8 path.
#[must_use]
pub fn default_config_file(dirs: &dyn BaseDirs) -> Option<Utf8PathBuf> {
    dirs.config_dir()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .map(|dir| dir.join(CONFIG_FILE_NAME))
}
