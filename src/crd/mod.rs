//! Custom resources the suite creates directly.
//!
//! - `LocalVolume`: devices by path, exposed as local PVs by the LSO
//! - `LocalVolumeSet`: devices by filter, exposed as local PVs by the LSO

mod local_storage;

pub use local_storage::*;
