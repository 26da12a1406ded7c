//! Small helpers shared by fixtures and scenarios.

pub mod capacity;
pub mod random;
pub mod slices;
pub mod version;

pub use capacity::{
    capacity_range_gi, format_gi, parse_capacity_gi, valid_random_capacity_by_csi_vol_type,
    valid_volume_size,
};
pub use random::{random_num, random_string, unique_name};
pub use slices::{contains, dedup_sorted, difference, intersect, value_to_string};
pub use version::{compare_versions, version_is_above};
