//! Re-scoring of FTS hits with time decay and access boost.
//!
//! BM25 ranks from SQLite are negative (more negative = better). The final
//! rank divides by two multipliers ≥ some floor, so a well-accessed or young
//! memory keeps more of its base score than a stale untouched one.

/// Default decay rate: 1/(1 + ageDays·rate) halves a score in ≈90 days.
pub const DEFAULT_DECAY_RATE: f64 = 0.0077;

const SECS_PER_DAY: f64 = 86_400.0;

/// Cap on how many rows to over-fetch before re-ranking.
pub fn overfetch(limit: usize) -> usize {
    (limit.saturating_mul(3)).min(100)
}

pub fn decay_factor(time_created: i64, now: i64, decay_rate: f64) -> f64 {
    let age_days = ((now - time_created).max(0)) as f64 / SECS_PER_DAY;
    1.0 / (1.0 + age_days * decay_rate)
}

pub fn access_boost(access_count: i64) -> f64 {
    1.0 + (1.0 + access_count.max(0) as f64).log2() * 0.1
}

/// `base_rank / (decay · boost)` — still negative, more negative = better.
pub fn final_rank(base_rank: f64, time_created: i64, access_count: i64, decay_rate: f64, now: i64) -> f64 {
    base_rank / (decay_factor(time_created, now, decay_rate) * access_boost(access_count))
}
