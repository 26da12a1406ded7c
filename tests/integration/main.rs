// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Integration tests for storage-e2e
//!
//! These tests require a running cluster reachable through `oc` (or
//! `STORAGE_CLI`) with the current kubeconfig. They are marked `#[ignore]`
//! and must be run explicitly:
//!
//! ```bash
//! # Run every scenario
//! cargo test --test integration -- --ignored
//!
//! # Run one scenario with debug logs
//! STORAGE_LOG_LEVEL=DEBUG cargo test --test integration test_online_expansion_to_15gi -- --ignored
//! ```
//!
//! ## Design Principles
//!
//! - **Isolation**: each scenario creates its own namespace
//! - **RAII Cleanup**: `TestNamespace` and `CleanupStack` tear down on drop,
//!   so a failed assertion does not leak volumes
//! - **Platform aware**: scenarios for a driver the platform lacks return early

mod cluster;
mod namespace;

mod provisioning_tests;
