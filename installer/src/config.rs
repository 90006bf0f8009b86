//! Optional TOML configuration file.
//!
//! Values are layered: command-line flags (and their environment variables)
//! win over the file, and the file wins over built-in defaults. A missing
//! file at the default location is not an error; a missing file named with
//! `--config` is.

use crate::dirs::{BaseDirs, default_bin_dir, default_config_file};
use crate::error::{InstallerError, Result};
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::installer::absolute_bin_dir;
use crate::pipeline::DEFAULT_RETRIES;
use crate::smoke::DEFAULT_SMOKE_TIMEOUT;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Settings read from `config.toml`.
///
/// # Examples
///
/// ```
/// use lm_tap_installer::config::InstallerConfig;
///
/// let config = InstallerConfig::from_toml("retries = 5").unwrap();
/// assert_eq!(config.retries, 5);
/// assert_eq!(config.fetch_timeout_secs, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    /// Directory binaries are installed into. A leading `~/` expands to the
    /// home directory.
    pub bin_dir: Option<Utf8PathBuf>,
    /// Whole-download timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Smoke test timeout in seconds.
    pub smoke_timeout_secs: u64,
    /// Extra download attempts after a fetch failure.
    pub retries: u32,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            smoke_timeout_secs: DEFAULT_SMOKE_TIMEOUT.as_secs(),
            retries: DEFAULT_RETRIES,
        }
    }
}

impl InstallerConfig {
    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error message for malformed input, unknown keys, or
    /// zero timeouts.
    pub fn from_toml(source: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(source).map_err(|e| e.message().to_owned())?;
        if config.fetch_timeout_secs == 0 {
            return Err("fetch_timeout_secs must be greater than zero".to_owned());
        }
        if config.smoke_timeout_secs == 0 {
            return Err("smoke_timeout_secs must be greater than zero".to_owned());
        }
        Ok(config)
    }

    /// Load the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if the file cannot be read or
    /// parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let config_error = |reason: String| InstallerError::Config {
            path: path.to_owned(),
            reason,
        };
        let source = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        debug!("loaded configuration from {path}");
        Self::from_toml(&source).map_err(config_error)
    }

    /// Load `explicit` if given, otherwise the platform default file when it
    /// exists, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if a file that should be read
    /// cannot be read or parsed.
    pub fn discover(explicit: Option<&Utf8Path>, dirs: &dyn BaseDirs) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_file(dirs) {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Download timeout as a [`Duration`].
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Smoke test timeout as a [`Duration`].
    #[must_use]
    pub fn smoke_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke_timeout_secs)
    }

    /// Pick the binary directory: `flag` first, then the file, then the
    /// platform default. The result is always absolute.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::NoBinDir`] if no source yields a directory
    /// and [`InstallerError::InvalidBinDir`] if the chosen one is empty.
    pub fn resolve_bin_dir(
        &self,
        flag: Option<&Utf8Path>,
        dirs: &dyn BaseDirs,
    ) -> Result<Utf8PathBuf> {
        let dir = match (flag, &self.bin_dir) {
            (Some(dir), _) => dir.to_owned(),
            (None, Some(dir)) => expand_home(dir, dirs)?,
            (None, None) => default_bin_dir(dirs).ok_or(InstallerError::NoBinDir)?,
        };
        absolute_bin_dir(&dir)
    }
}

fn expand_home(dir: &Utf8Path, dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    let Ok(rest) = dir.strip_prefix("~") else {
        return Ok(dir.to_owned());
    };
    dirs.home_dir()
        .and_then(|home| Utf8PathBuf::try_from(home).ok())
        .map(|home| home.join(rest))
        .ok_or(InstallerError::NoBinDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirs::MockBaseDirs;
    use rstest::rstest;
    use std::path::PathBuf;

    fn dirs_with_home(home: &'static str) -> MockBaseDirs {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_home_dir()
            .returning(move || Some(PathBuf::from(home)));
        dirs.expect_bin_dir()
            .returning(move || Some(PathBuf::from(home).join(".local/bin")));
        dirs.expect_config_dir().returning(|| None);
        dirs
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = InstallerConfig::from_toml("").expect("parses");
        assert_eq!(config, InstallerConfig::default());
        assert_eq!(config.smoke_timeout(), Duration::from_secs(10));
    }

    #[rstest]
    #[case::unknown_key("colour = true", "unknown field")]
    #[case::zero_fetch("fetch_timeout_secs = 0", "fetch_timeout_secs")]
    #[case::zero_smoke("smoke_timeout_secs = 0", "smoke_timeout_secs")]
    #[case::wrong_type("retries = \"many\"", "invalid type")]
    fn invalid_files_are_rejected(#[case] source: &str, #[case] needle: &str) {
        let err = InstallerConfig::from_toml(source).expect_err("invalid");
        assert!(err.contains(needle), "{err}");
    }

    #[rstest]
    #[case::flag_wins(Some("/opt/bin"), Some("/srv/bin"), "/opt/bin")]
    #[case::file_beats_default(None, Some("/srv/bin"), "/srv/bin")]
    #[case::tilde_expands(None, Some("~/bin"), "/home/test/bin")]
    #[case::default(None, None, "/home/test/.local/bin")]
    fn bin_dir_precedence(
        #[case] flag: Option<&str>,
        #[case] file: Option<&str>,
        #[case] expected: &str,
    ) {
        let config = InstallerConfig {
            bin_dir: file.map(Utf8PathBuf::from),
            ..InstallerConfig::default()
        };
        let dirs = dirs_with_home("/home/test");
        let resolved = config
            .resolve_bin_dir(flag.map(Utf8Path::new), &dirs)
            .expect("resolves");
        assert_eq!(resolved, Utf8PathBuf::from(expected));
    }

    #[rstest]
    #[case::empty_flag(Some(""), None)]
    #[case::blank_flag(Some("  "), None)]
    #[case::empty_file(None, Some(""))]
    fn empty_bin_dir_is_rejected(#[case] flag: Option<&str>, #[case] file: Option<&str>) {
        let config = InstallerConfig {
            bin_dir: file.map(Utf8PathBuf::from),
            ..InstallerConfig::default()
        };
        let dirs = dirs_with_home("/home/test");
        let err = config
            .resolve_bin_dir(flag.map(Utf8Path::new), &dirs)
            .expect_err("empty bin dir");
        assert!(matches!(err, InstallerError::InvalidBinDir { .. }), "{err}");
        assert_eq!(err.stage().to_string(), "setup");
    }

    #[test]
    fn relative_bin_dir_becomes_absolute() {
        let dirs = dirs_with_home("/home/test");
        let resolved = InstallerConfig::default()
            .resolve_bin_dir(Some(Utf8Path::new("bin")), &dirs)
            .expect("resolves");
        assert!(resolved.is_absolute(), "{resolved}");
        assert!(resolved.ends_with("bin"));
        let cwd = std::env::current_dir().expect("current dir");
        assert_eq!(resolved.as_std_path(), cwd.join("bin"));
    }

    #[test]
    fn missing_default_bin_dir_is_an_error() {
        let mut dirs = MockBaseDirs::new();
        dirs.expect_bin_dir().returning(|| None);
        let err = InstallerConfig::default()
            .resolve_bin_dir(None, &dirs)
            .expect_err("no bin dir");
        assert!(matches!(err, InstallerError::NoBinDir));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dirs = dirs_with_home("/home/test");
        let path = Utf8Path::new("/nonexistent/lm-tap.toml");
        let err = InstallerConfig::discover(Some(path), &dirs).expect_err("missing file");
        assert!(matches!(err, InstallerError::Config { .. }), "{err}");
    }

    #[test]
    fn discover_reads_default_location() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = temp.path().to_path_buf();
        std::fs::write(dir.join("config.toml"), "retries = 7\n").expect("write config");

        let mut dirs = MockBaseDirs::new();
        dirs.expect_config_dir()
            .returning(move || Some(dir.clone()));
        let config = InstallerConfig::discover(None, &dirs).expect("loads");
        assert_eq!(config.retries, 7);
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let dirs = dirs_with_home("/home/test");
        let config = InstallerConfig::discover(None, &dirs).expect("defaults");
        assert_eq!(config, InstallerConfig::default());
    }
}
