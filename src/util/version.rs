//! Dotted version comparison.

use std::cmp::Ordering;

use crate::error::{Error, Result};

fn segments(version: &str) -> Result<Vec<u64>> {
    version
        .split('.')
        .map(|segment| {
            segment.trim().parse::<u64>().map_err(|_| {
                Error::Validation(format!(
                    "version {version:?} has non-numeric segment {segment:?}"
                ))
            })
        })
        .collect()
}

/// Compare two dotted versions segment by segment.
///
/// Both versions must have the same number of segments; the first
/// differing segment decides.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    let left = segments(a)?;
    let right = segments(b)?;
    if left.len() != right.len() {
        return Err(Error::Validation(format!(
            "versions {a:?} and {b:?} have different segment counts"
        )));
    }
    Ok(left
        .iter()
        .zip(&right)
        .map(|(l, r)| l.cmp(r))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal))
}

/// Whether `a` is strictly newer than `b`.
///
/// # Panics
///
/// Panics when the versions have different segment counts or a segment is
/// not an integer; callers compare versions of one known shape.
#[allow(clippy::panic)]
pub fn version_is_above(a: &str, b: &str) -> bool {
    match compare_versions(a, b) {
        Ok(ordering) => ordering == Ordering::Greater,
        Err(e) => panic!("{e}"),
    }
}
