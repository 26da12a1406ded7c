// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for storage-e2e.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::cmp::Ordering;

use proptest::prelude::*;
use serde_json::json;

use storage_e2e::CloudProvider;
use storage_e2e::template::json_path;
use storage_e2e::util::{
    capacity_range_gi, compare_versions, format_gi, parse_capacity_gi,
    valid_random_capacity_by_csi_vol_type, valid_volume_size, version_is_above,
};

/// Strategy for dotted versions with a fixed number of segments.
fn version(segments: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(0u64..50, segments).prop_map(|parts| {
        parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    })
}

/// Strategy for providers with distinct capacity floors.
fn any_provider() -> impl Strategy<Value = CloudProvider> {
    prop_oneof![
        Just(CloudProvider::Aws),
        Just(CloudProvider::Azure),
        Just(CloudProvider::Gcp),
        Just(CloudProvider::AlibabaCloud),
        Just(CloudProvider::IbmCloud),
        Just(CloudProvider::Vsphere),
        Just(CloudProvider::None),
    ]
}

proptest! {
    /// A version is never above itself
    #[test]
    fn version_is_irreflexive(v in version(3)) {
        prop_assert!(!version_is_above(&v, &v));
        prop_assert_eq!(compare_versions(&v, &v).unwrap(), Ordering::Equal);
    }

    /// At most one of a > b, b > a holds, and exactly one unless equal
    #[test]
    fn version_order_is_strict(a in version(3), b in version(3)) {
        let ab = version_is_above(&a, &b);
        let ba = version_is_above(&b, &a);
        prop_assert!(!(ab && ba));
        if a != b {
            prop_assert!(ab || ba);
        }
    }

    /// Comparing versions of different shapes is an error, not a guess
    #[test]
    fn version_shape_mismatch_errors(a in version(2), b in version(3)) {
        prop_assert!(compare_versions(&a, &b).is_err());
    }

    /// Default sizes stay inside the provider's range and carry a Gi suffix
    #[test]
    fn default_capacity_in_provider_range(provider in any_provider()) {
        let size = valid_volume_size(&provider);
        prop_assert!(size.ends_with("Gi"));
        let gi = parse_capacity_gi(&size).unwrap();
        prop_assert!(provider.volume_size_range_gi().contains(&gi), "{} -> {}", provider, size);
    }

    /// EBS io1 capacities are always between 4Gi and 20Gi
    #[test]
    fn ebs_io1_capacity_in_range(_seed in 0u8..32) {
        let size = valid_random_capacity_by_csi_vol_type(&CloudProvider::Aws, "ebs.csi.aws.com", "io1");
        let gi = parse_capacity_gi(&size).unwrap();
        prop_assert!((4..=20).contains(&gi), "{}", size);
    }

    /// Capacity ranges are never empty and never start at zero
    #[test]
    fn capacity_ranges_are_sane(
        provider in any_provider(),
        volume_type in prop_oneof![Just("gp3"), Just("io2"), Just("st1"), Just("pd-ssd")],
    ) {
        let range = capacity_range_gi(&provider, "ebs.csi.aws.com", volume_type);
        prop_assert!(*range.start() >= 1);
        prop_assert!(range.start() <= range.end());
    }

    /// Formatting then parsing whole Gi is lossless
    #[test]
    fn capacity_format_parse(gi in 0u64..100_000) {
        prop_assert_eq!(parse_capacity_gi(&format_gi(gi)).unwrap(), gi);
    }

    /// Mi quantities round up to the next whole Gi
    #[test]
    fn mebibytes_round_up(mi in 1u64..10_000_000) {
        let gi = parse_capacity_gi(&format!("{mi}Mi")).unwrap();
        prop_assert!(gi * 1024 >= mi);
        prop_assert!((gi - 1) * 1024 < mi);
    }

    /// A value set at a path reads back from the same path
    #[test]
    fn json_path_set_then_get(
        keys in prop::collection::vec("[a-zA-Z][a-zA-Z0-9]{0,8}", 1..5),
        value in any::<i64>(),
    ) {
        let mut root = json!({"items": [{"spec": {}}]});
        let path = format!("items.0.spec.{}", keys.join("."));
        json_path::set(&mut root, &path, json!(value)).unwrap();
        prop_assert_eq!(json_path::get(&root, &path), Some(&json!(value)));
    }
}
