//! Random names and numbers.

use rand::Rng;

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the random suffix appended to fixture names
pub const SUFFIX_LEN: usize = 8;

/// Eight random characters from `[a-z0-9]`, safe in DNS-1123 names
pub fn random_string() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .filter_map(|_| NAME_ALPHABET.get(rng.gen_range(0..NAME_ALPHABET.len())))
        .map(|b| char::from(*b))
        .collect()
}

/// Uniform integer in `min..=max`; bounds are swapped when reversed
pub fn random_num(min: i64, max: i64) -> i64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    rand::thread_rng().gen_range(lo..=hi)
}

/// `{prefix}-{random_string()}`
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", random_string())
}
