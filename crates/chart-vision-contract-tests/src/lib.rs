#![warn(missing_docs)]
//! # chart-vision-contract-tests
//!
//! Frozen JSON schemas and fixtures live under the workspace `contracts/`
//! directory. This crate only locates them; validation runs in `tests/`.

use std::path::PathBuf;

/// Returns the workspace `contracts/` directory.
pub fn contracts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("contracts")
}

/// Returns the path of a file under `contracts/`.
pub fn contract_path(relative: &str) -> PathBuf {
    contracts_dir().join(relative)
}
