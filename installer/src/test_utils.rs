//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behaviour tests under `tests/`.
#![expect(
    clippy::expect_used,
    reason = "fixture helpers abort the test on setup failure"
)]

use crate::fetch::{ArtefactFetcher, FetchError};
use crate::formula::parser::parse_formula;
use crate::formula::platform::HostPlatform;
use crate::formula::sha256_digest::Sha256Digest;
use crate::formula::tap::Tap;
use camino::Utf8PathBuf;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The Apple silicon host most tests resolve for.
#[must_use]
pub fn arm_host() -> HostPlatform {
    HostPlatform::new("macos", "arm64")
}

/// The Intel host.
#[must_use]
pub fn intel_host() -> HostPlatform {
    HostPlatform::new("macos", "amd64")
}

/// Formula TOML with one release per `(version, digest)` pair; both
/// architectures share the digest.
#[must_use]
pub fn formula_toml(name: &str, releases: &[(&str, &Sha256Digest)]) -> String {
    let mut toml = format!(
        "name = \"{name}\"\n\
         description = \"Focused Lunch Money v2 CLI for transaction review workflows\"\n\
         homepage = \"https://example.test/{name}\"\n\
         binary = \"lm\"\n"
    );
    for (version, digest) in releases {
        write!(toml, "\n[[release]]\nversion = \"{version}\"\n").expect("write to string");
        for arch in ["arm64", "amd64"] {
            write!(
                toml,
                "\n[[release.variant]]\n\
                 os = \"macos\"\n\
                 arch = \"{arch}\"\n\
                 url = \"https://example.test/{name}/v{{version}}/lm-darwin-{arch}.tar.gz\"\n\
                 sha256 = \"{digest}\"\n"
            )
            .expect("write to string");
        }
    }
    toml
}

/// A tap holding a single formula with one release.
///
/// # Panics
///
/// Panics if the generated formula is invalid.
#[must_use]
pub fn tap_with_release(name: &str, version: &str, digest: &Sha256Digest) -> Tap {
    tap_with_releases(name, &[(version, digest)])
}

/// A tap holding a single formula with the given releases.
///
/// # Panics
///
/// Panics if the generated formula is invalid.
#[must_use]
pub fn tap_with_releases(name: &str, releases: &[(&str, &Sha256Digest)]) -> Tap {
    let formula = parse_formula(&formula_toml(name, releases)).expect("generated formula is valid");
    Tap::from_formulas([formula]).expect("single formula")
}

/// Build a `.tar.gz` archive holding regular files.
///
/// # Panics
///
/// Panics if the archive cannot be assembled in memory.
#[must_use]
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, path, *contents)
            .expect("append entry");
    }
    builder
        .into_inner()
        .and_then(flate2::write::GzEncoder::finish)
        .expect("finish archive")
}

/// A shell script that prints `output` and exits 0.
#[must_use]
pub fn cli_script(output: &str) -> Vec<u8> {
    format!("#!/bin/sh\necho '{output}'\n").into_bytes()
}

/// An artifact whose `lm` entry prints `output`.
#[must_use]
pub fn cli_artifact(output: &str) -> Vec<u8> {
    tar_gz(&[("lm", cli_script(output).as_slice())])
}

/// Write an executable `/bin/sh` script named `name` into `dir`.
///
/// # Panics
///
/// Panics if the file cannot be written or `dir` is not UTF-8.
#[cfg(unix)]
#[must_use]
pub fn write_script(dir: &Path, name: &str, body: &str) -> Utf8PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    Utf8PathBuf::from_path_buf(path).expect("UTF-8 path")
}

/// An in-memory [`ArtefactFetcher`] that serves canned responses.
///
/// Responses are consumed in order; the last one repeats forever. Every
/// call is counted and its url recorded, so tests can prove that a
/// failure happened before any network access.
#[derive(Debug)]
pub struct StubFetcher {
    responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
    urls: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    /// A fetcher replaying `responses`.
    ///
    /// # Panics
    ///
    /// Panics if `responses` is empty.
    #[must_use]
    pub fn new(responses: Vec<Result<Vec<u8>, FetchError>>) -> Self {
        assert!(!responses.is_empty(), "StubFetcher needs at least one response");
        Self {
            responses: Mutex::new(responses.into()),
            urls: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A fetcher that always serves `bytes`.
    #[must_use]
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self::new(vec![Ok(bytes)])
    }

    /// Number of `fetch` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Urls requested so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn requested_urls(&self) -> Vec<String> {
        self.urls.lock().expect("urls lock").clone()
    }
}

impl ArtefactFetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().expect("urls lock").push(url.to_owned());
        let mut responses = self.responses.lock().expect("responses lock");
        if responses.len() > 1 {
            responses.pop_front().expect("non-empty queue")
        } else {
            responses.front().cloned().expect("non-empty queue")
        }
    }
}
