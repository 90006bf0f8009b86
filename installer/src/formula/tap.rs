//! The tap: every formula the installer knows about.
//!
//! A tap maps package names and aliases to [`Formula`] ledgers and resolves
//! an install request to one release and one platform variant. Resolution is
//! pure; it never performs I/O, so an unknown version is reported before any
//! network access happens.

use super::descriptor::{Formula, PackageDescriptor, PlatformVariant};
use super::error::FormulaError;
use super::parser::parse_formula;
use super::platform::HostPlatform;
use super::version::ReleaseVersion;
use crate::error::{InstallerError, Result};
use camino::Utf8Path;
use log::debug;
use std::collections::BTreeMap;

/// Formula records compiled into the installer.
const BUILTIN_FORMULAS: &[(&str, &str)] = &[
    ("Formula/lm.toml", include_str!("../../../Formula/lm.toml")),
    (
        "Formula/lunchmoney-cli.toml",
        include_str!("../../../Formula/lunchmoney-cli.toml"),
    ),
];

/// File extension of formula records.
const FORMULA_EXTENSION: &str = "toml";

/// A set of formulas addressable by name or alias.
#[derive(Debug, Clone, Default)]
pub struct Tap {
    formulas: BTreeMap<String, Formula>,
    names: BTreeMap<String, String>,
}

/// A release and the single variant chosen for the host.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    /// The selected release.
    pub descriptor: &'a PackageDescriptor,
    /// The build matching the host platform.
    pub variant: &'a PlatformVariant,
}

impl Tap {
    /// Build a tap from already-parsed formulas.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError::DuplicatePackage`] when two formulas claim
    /// the same name or alias.
    pub fn from_formulas(
        formulas: impl IntoIterator<Item = Formula>,
    ) -> std::result::Result<Self, FormulaError> {
        let mut tap = Self::default();
        for formula in formulas {
            for name in formula.names() {
                if tap.names.contains_key(name) {
                    return Err(FormulaError::DuplicatePackage {
                        name: name.to_owned(),
                    });
                }
                tap.names.insert(name.to_owned(), formula.name.clone());
            }
            tap.formulas.insert(formula.name.clone(), formula);
        }
        Ok(tap)
    }

    /// Load the formulas shipped inside the installer binary.
    ///
    /// # Errors
    ///
    /// Returns an error if a bundled formula fails validation.
    pub fn builtin() -> std::result::Result<Self, FormulaError> {
        let formulas = BUILTIN_FORMULAS
            .iter()
            .map(|(path, source)| {
                debug!("loading bundled formula {path}");
                parse_formula(source)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::from_formulas(formulas)
    }

    /// Load every `*.toml` formula in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`FormulaError::Read`] when the directory or a file cannot be
    /// read, or the parse error of the first invalid formula.
    pub fn load_dir(dir: &Utf8Path) -> std::result::Result<Self, FormulaError> {
        let read_error = |path: &Utf8Path, e: &std::io::Error| FormulaError::Read {
            path: path.to_string(),
            reason: e.to_string(),
        };

        let mut paths = Vec::new();
        for entry in dir.read_dir_utf8().map_err(|e| read_error(dir, &e))? {
            let entry = entry.map_err(|e| read_error(dir, &e))?;
            let path = entry.path();
            let is_formula = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(FORMULA_EXTENSION));
            if is_formula && path.is_file() {
                paths.push(path.to_owned());
            }
        }
        paths.sort();

        let mut formulas = Vec::with_capacity(paths.len());
        for path in &paths {
            debug!("loading formula {path}");
            let source = std::fs::read_to_string(path).map_err(|e| read_error(path, &e))?;
            let formula = parse_formula(&source).map_err(|e| match e {
                FormulaError::Syntax { reason } => FormulaError::Syntax {
                    reason: format!("{path}: {reason}"),
                },
                other => other,
            })?;
            formulas.push(formula);
        }
        Self::from_formulas(formulas)
    }

    /// Look up a formula by name or alias.
    #[must_use]
    pub fn formula(&self, name: &str) -> Option<&Formula> {
        self.names
            .get(name)
            .and_then(|canonical| self.formulas.get(canonical))
    }

    /// Iterate over formulas in name order.
    pub fn formulas(&self) -> impl Iterator<Item = &Formula> {
        self.formulas.values()
    }

    /// Resolve a package request for `host`.
    ///
    /// With no `version`, the newest release is chosen. Otherwise the
    /// release must match exactly.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::UnknownPackage`] if no formula answers to `name`.
    /// - [`InstallerError::UnknownVersion`] if the release does not exist.
    /// - [`InstallerError::UnsupportedPlatform`] if the release has no
    ///   variant for `host`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lm_tap_installer::formula::platform::HostPlatform;
    /// use lm_tap_installer::formula::tap::Tap;
    ///
    /// let tap = Tap::builtin().unwrap();
    /// let host = HostPlatform::new("macos", "aarch64");
    /// let resolution = tap.resolve("lm", Some("0.1.1"), &host).unwrap();
    /// assert!(resolution.variant.url.ends_with("lm-darwin-arm64.tar.gz"));
    /// ```
    pub fn resolve<'a>(
        &'a self,
        name: &str,
        version: Option<&str>,
        host: &HostPlatform,
    ) -> Result<Resolution<'a>> {
        let formula = self
            .formula(name)
            .ok_or_else(|| InstallerError::UnknownPackage {
                name: name.to_owned(),
            })?;

        let descriptor = match version {
            Some(requested) => find_release(formula, requested)?,
            None => formula
                .latest()
                .ok_or_else(|| InstallerError::UnknownVersion {
                    package: formula.name.clone(),
                    version: "latest".to_owned(),
                    available: String::new(),
                })?,
        };

        let variant = descriptor
            .variant_for(host)
            .ok_or_else(|| InstallerError::UnsupportedPlatform {
                package: formula.name.clone(),
                version: descriptor.version.to_string(),
                host: host.to_string(),
            })?;

        debug!(
            "resolved {} {} for {host} to {}",
            formula.name, descriptor.version, variant.url
        );
        Ok(Resolution {
            descriptor,
            variant,
        })
    }
}

fn find_release<'a>(formula: &'a Formula, requested: &str) -> Result<&'a PackageDescriptor> {
    let unknown = || InstallerError::UnknownVersion {
        package: formula.name.clone(),
        version: requested.to_owned(),
        available: formula
            .releases
            .iter()
            .map(|r| r.version.to_string())
            .collect::<Vec<_>>()
            .join(", "),
    };
    let version: ReleaseVersion = requested.parse().map_err(|_| unknown())?;
    formula.release(&version).ok_or_else(unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::platform::Arch;
    use rstest::{fixture, rstest};

    #[fixture]
    fn tap() -> Tap {
        Tap::builtin().expect("bundled formulas are valid")
    }

    #[fixture]
    fn arm_host() -> HostPlatform {
        HostPlatform::new("macos", "arm64")
    }

    #[rstest]
    fn builtin_tap_contains_both_namespaces(tap: Tap) {
        let names: Vec<&str> = tap.formulas().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["lm", "lunchmoney-cli"]);
        let lm = tap.formula("lm").expect("lm formula");
        let legacy = tap.formula("lunchmoney-cli").expect("legacy formula");
        assert_eq!(lm.binary, legacy.binary);
    }

    #[rstest]
    #[case::arm("arm64", Arch::Arm64)]
    #[case::intel("amd64", Arch::Amd64)]
    fn resolve_selects_host_arch(tap: Tap, #[case] arch: &str, #[case] expected: Arch) {
        let host = HostPlatform::new("macos", arch);
        let resolution = tap.resolve("lm", None, &host).expect("resolves");
        assert_eq!(resolution.variant.platform.arch, expected);
        assert!(resolution.variant.url.contains(&resolution.descriptor.version.to_string()));
    }

    #[rstest]
    fn resolve_reports_unknown_version(tap: Tap, arm_host: HostPlatform) {
        let err = tap
            .resolve("lm", Some("9.9.9"), &arm_host)
            .expect_err("9.9.9 is not published");
        assert!(
            matches!(err, InstallerError::UnknownVersion { ref version, ref available, .. }
                if version == "9.9.9" && available == "0.1.1"),
            "{err}"
        );
    }

    #[rstest]
    #[case::not_semver("latest")]
    #[case::partial("0.1")]
    fn unparseable_versions_are_unknown(tap: Tap, arm_host: HostPlatform, #[case] version: &str) {
        let err = tap
            .resolve("lm", Some(version), &arm_host)
            .expect_err("unknown");
        assert!(matches!(err, InstallerError::UnknownVersion { .. }));
    }

    #[rstest]
    fn resolve_reports_unknown_package(tap: Tap, arm_host: HostPlatform) {
        let err = tap.resolve("nope", None, &arm_host).expect_err("unknown");
        assert!(matches!(err, InstallerError::UnknownPackage { ref name } if name == "nope"));
    }

    #[rstest]
    fn resolve_reports_unsupported_host(tap: Tap) {
        let host = HostPlatform::new("linux", "x86_64");
        let err = tap.resolve("lm", None, &host).expect_err("no linux build");
        assert!(
            matches!(err, InstallerError::UnsupportedPlatform { ref host, .. }
                if host == "linux/amd64"),
            "{err}"
        );
    }

    #[rstest]
    fn resolve_rejects_32_bit_arm_host(tap: Tap) {
        let host = HostPlatform::new("macos", "arm");
        let err = tap.resolve("lm", None, &host).expect_err("no 32-bit build");
        assert!(
            matches!(err, InstallerError::UnsupportedPlatform { ref host, .. }
                if host == "macos/arm"),
            "{err}"
        );
    }

    #[rstest]
    fn aliases_resolve_to_their_formula(tap: Tap, arm_host: HostPlatform) {
        let mut formula = tap.formula("lm").expect("lm formula").clone();
        formula.aliases = vec!["lunchmoney".to_owned()];
        let aliased = Tap::from_formulas([formula]).expect("no conflicts");
        let resolution = aliased
            .resolve("lunchmoney", None, &arm_host)
            .expect("alias resolves");
        assert_eq!(resolution.descriptor.name, "lm");
    }

    #[rstest]
    fn conflicting_names_are_rejected(tap: Tap) {
        let lm = tap.formula("lm").expect("lm formula").clone();
        let mut impostor = lm.clone();
        impostor.name = "other".to_owned();
        impostor.aliases = vec!["lm".to_owned()];
        let err = Tap::from_formulas([lm, impostor]).expect_err("alias collides");
        assert_eq!(
            err,
            FormulaError::DuplicatePackage {
                name: "lm".to_owned()
            }
        );
    }

    #[test]
    fn load_dir_reads_toml_files_only() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = Utf8Path::from_path(temp.path()).expect("UTF-8 temp dir");
        std::fs::write(dir.join("lm.toml"), BUILTIN_FORMULAS[0].1).expect("write formula");
        std::fs::write(dir.join("README.md"), "not a formula").expect("write readme");

        let tap = Tap::load_dir(dir).expect("loads");
        assert_eq!(tap.formulas().count(), 1);
        assert!(tap.formula("lm").is_some());
    }

    #[test]
    fn load_dir_accepts_uppercase_extension() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = Utf8Path::from_path(temp.path()).expect("UTF-8 temp dir");
        std::fs::write(dir.join("LM.TOML"), BUILTIN_FORMULAS[0].1).expect("write formula");

        let tap = Tap::load_dir(dir).expect("loads");
        assert!(tap.formula("lm").is_some());
    }

    #[test]
    fn load_dir_names_the_broken_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = Utf8Path::from_path(temp.path()).expect("UTF-8 temp dir");
        std::fs::write(dir.join("broken.toml"), "name = ").expect("write formula");

        let err = Tap::load_dir(dir).expect_err("broken formula");
        assert!(err.to_string().contains("broken.toml"), "{err}");
    }

    #[test]
    fn load_dir_reports_missing_directory() {
        let err = Tap::load_dir(Utf8Path::new("/nonexistent/lm-tap/formulas"))
            .expect_err("missing dir");
        assert!(matches!(err, FormulaError::Read { .. }));
    }
}
