//! Display-name allocation.
//!
//! Rooms full of anonymous clients collide on the default name constantly,
//! so the allocator resolves the common case (base name free, or free after
//! one random suffix) instantly and bounds the pathological case.

use std::collections::HashSet;

use rand::Rng;

const RANDOM_ATTEMPTS: usize = 500;
const SEQUENTIAL_LIMIT: u32 = 10_000;

/// Pick a display name unique (case-insensitively) against `taken`, a set
/// of lower-cased names already in use in the room.
///
/// Strategy: the base name unchanged if free; otherwise up to 500 random
/// 3-digit suffixes in `[100, 999]`; otherwise sequential suffixes from 2
/// up to 10000. The final timestamp-derived suffix is best-effort only and
/// may itself collide; it reduces collision frequency rather than
/// guaranteeing uniqueness.
pub fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }

    let mut rng = rand::thread_rng();
    for _ in 0..RANDOM_ATTEMPTS {
        let candidate = format!("{base}{}", rng.gen_range(100..=999));
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
    }

    for n in 2..SEQUENTIAL_LIMIT {
        let candidate = format!("{base}{n}");
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
    }

    format!("{base}{}", chrono::Utc::now().timestamp_millis() % 100_000)
}
