//! Volume capacity sizing.
//!
//! Capacities are always rendered with a `Gi` suffix. Provider floors come
//! from [`CloudProvider::volume_size_range_gi`]; a few EBS volume types have
//! their own minimums.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use super::random::random_num;
use crate::cloud::CloudProvider;
use crate::error::{Error, Result};

const EBS_PROVISIONER: &str = "ebs.csi.aws.com";

static QUANTITY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(Mi|Gi|Ti)?\s*$").ok());

/// Render a whole number of Gi
pub fn format_gi(gi: u64) -> String {
    format!("{gi}Gi")
}

fn random_in(range: RangeInclusive<u64>) -> u64 {
    let lo = i64::try_from(*range.start()).unwrap_or(i64::MAX);
    let hi = i64::try_from(*range.end()).unwrap_or(i64::MAX);
    u64::try_from(random_num(lo, hi)).unwrap_or(*range.start())
}

/// A random capacity valid for any default volume on `provider`
pub fn valid_volume_size(provider: &CloudProvider) -> String {
    format_gi(random_in(provider.volume_size_range_gi()))
}

/// Size range for a provisioner/volume-type pair on `provider`
pub fn capacity_range_gi(
    provider: &CloudProvider,
    provisioner: &str,
    volume_type: &str,
) -> RangeInclusive<u64> {
    if provisioner == EBS_PROVISIONER {
        match volume_type {
            "io1" | "io2" => return 4..=20,
            "st1" | "sc1" => return 125..=200,
            _ => {}
        }
    }
    provider.volume_size_range_gi()
}

/// A random capacity valid for `volume_type` of `provisioner`.
///
/// EBS `io1`/`io2` need at least 4Gi and `st1`/`sc1` at least 125Gi; every
/// other combination uses the provider default range.
pub fn valid_random_capacity_by_csi_vol_type(
    provider: &CloudProvider,
    provisioner: &str,
    volume_type: &str,
) -> String {
    format_gi(random_in(capacity_range_gi(
        provider,
        provisioner,
        volume_type,
    )))
}

/// Parse a `Mi`/`Gi`/`Ti` quantity into whole Gi, rounding Mi up.
///
/// A bare number is taken as Gi.
pub fn parse_capacity_gi(quantity: &str) -> Result<u64> {
    let invalid = || Error::Validation(format!("unsupported capacity {quantity:?}"));
    let caps = QUANTITY_RE
        .as_ref()
        .and_then(|re| re.captures(quantity))
        .ok_or_else(invalid)?;
    let value: u64 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(invalid)?;
    match caps.get(2).map(|m| m.as_str()) {
        Some("Mi") => Ok(value.div_ceil(1024)),
        Some("Ti") => value.checked_mul(1024).ok_or_else(invalid),
        _ => Ok(value),
    }
}
