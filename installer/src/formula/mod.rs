//! Formula records: the declarative release ledger for each package.
//!
//! A formula is one TOML file naming a package and listing its releases,
//! each with one artifact per supported platform. Parsing validates every
//! ledger invariant, so the types exported here can be trusted by the rest
//! of the installer without re-checking.

pub mod descriptor;
pub mod error;
pub mod parser;
pub mod platform;
pub mod sha256_digest;
pub mod tap;
pub mod version;
