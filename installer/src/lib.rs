//! lm-tap installer library.
//!
//! This crate implements the distribution contract of the Lunch Money CLI
//! tap: resolve a release for the host platform, fetch its artifact over
//! HTTPS, verify the SHA-256 digest, place the executable atomically and
//! smoke-test it. It is used by the `lm-tap` binary and can be consumed
//! programmatically for testing or custom installation workflows.
//!
//! # Modules
//!
//! - [`audit`] - Tap-wide digest audit
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Optional TOML configuration file
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`error`] - Installer error taxonomy with pipeline stages
//! - [`extraction`] - Archive unpacking with path traversal protection
//! - [`fetch`] - HTTPS artifact download
//! - [`formula`] - Formula parsing, validation and release resolution
//! - [`installer`] - Atomic placement, locking and uninstall
//! - [`logging`] - Diagnostic log subscriber setup
//! - [`output`] - Human and JSON output formatting
//! - [`pipeline`] - Install pipeline orchestration and retries
//! - [`receipt`] - Install receipts
//! - [`smoke`] - Post-install smoke test
//! - [`verify`] - SHA-256 integrity gate

pub mod audit;
pub mod cli;
pub mod config;
pub mod dirs;
pub mod error;
pub mod extraction;
pub mod fetch;
pub mod formula;
pub mod installer;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod receipt;
pub mod smoke;
pub mod verify;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
