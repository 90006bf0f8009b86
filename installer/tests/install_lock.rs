//! Concurrent installs into one binary directory.
//!
//! The per-binary lock is held from placement through the smoke test, so
//! two installs racing on the same directory must never run the installed
//! binary at the same time.
#![cfg(unix)]

use camino::Utf8PathBuf;
use lm_tap_installer::formula::sha256_digest::Sha256Digest;
use lm_tap_installer::pipeline::{
    PipelineConfig, RetryPolicy, install_package, list_installed,
};
use lm_tap_installer::test_utils::{StubFetcher, arm_host, tap_with_release, tar_gz};
use rstest::rstest;
use std::thread;

/// Fails if another copy of itself is running from the same directory.
const OVERLAP_DETECTOR: &str = r#"#!/bin/sh
marker="$(dirname "$0")/.smoke-running"
if ( set -C; : > "$marker" ) 2>/dev/null; then
  sleep 0.3
  rm -f "$marker"
  echo 'Lunch Money CLI'
else
  echo 'overlapping smoke tests'
  exit 1
fi
"#;

#[rstest]
fn racing_installs_are_serialized() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let bin_dir = Utf8PathBuf::from_path_buf(temp_dir.path().join("bin")).expect("UTF-8 path");
    let artifact = tar_gz(&[("lm", OVERLAP_DETECTOR.as_bytes())]);
    let tap = tap_with_release("lm", "0.1.1", &Sha256Digest::compute(&artifact));
    let fetcher = StubFetcher::serving(artifact);
    let config = PipelineConfig {
        host: arm_host(),
        retry: RetryPolicy::none(),
        quiet: true,
        ..PipelineConfig::new(bin_dir.clone())
    };

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(|| {
                    install_package(&tap, "lm", None, &config, &fetcher, &mut Vec::new())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("install thread panicked"))
            .collect()
    });

    for result in results {
        let outcome = result.expect("both installs succeed");
        assert!(outcome.smoke.is_some());
    }
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(list_installed(&bin_dir).expect("list receipts").len(), 1);
    assert!(bin_dir.join(".lm-tap").join("locks").join("lm.lock").is_file());
}
