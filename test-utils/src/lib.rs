//! Shared test utilities for the azure-kms workspace.
//!
//! This crate provides:
//! - Proptest generators for key URIs, environments and algorithms
//! - Mock vault clients, client factories and credentials
//! - Test fixtures with sample keys and service bodies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;

use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`, once per process.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
