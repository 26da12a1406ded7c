// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the storage fixtures.
//!
//! Every fixture is driven through its real create/wait/delete code path
//! against a scripted `oc` ([`common::ScriptedRunner`]) and the templates
//! shipped in `testdata/storage`. No cluster is required.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_pvc_bound_volume_carries_disk_tags
//! ```
//!
//! ## Test Categories
//!
//! - **StorageClass / PVC / PV / Pod / Deployment**: rendered objects,
//!   negative-mode admission, wait semantics
//! - **Local storage**: typed LocalVolume/LocalVolumeSet submission and
//!   PV recreation
//! - **NFS**: server install flow
//! - **Cloud volumes**: `aws ec2` backed lifecycle
//! - **Cleanup**: LIFO teardown, drop-time draining

#[path = "../common/mod.rs"]
mod common;

mod nfs_tests;
mod pod_tests;
mod pv_tests;
