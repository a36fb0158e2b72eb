//! # Quota Arithmetic
//!
//! Quotas are set in GB (2^30 bytes) and compared against byte counters.
//! All math is integer and saturating; there is no floating point anywhere
//! on the quota path.
//!
//! ```text
//! quota_gb = 5  ──►  limit = 5 × 2^30 = 5_368_709_120 bytes
//!
//! used = limit - 1  ──►  under quota
//! used = limit      ──►  over quota
//! ```

/// Bytes per quota unit.
pub const GIB: u64 = 1 << 30;

/// Converts a GB quota to bytes, saturating at `u64::MAX`.
#[inline]
pub const fn quota_bytes(quota_gb: u64) -> u64 {
    quota_gb.saturating_mul(GIB)
}

/// Whether `used_bytes` has reached the quota.
///
/// `None` means unlimited and is never over quota.
#[inline]
pub fn is_over_quota(used_bytes: u64, quota_gb: Option<u64>) -> bool {
    match quota_gb {
        Some(q) => used_bytes >= quota_bytes(q),
        None => false,
    }
}

/// Bytes left before the quota is reached, or `None` when unlimited.
pub fn remaining_bytes(used_bytes: u64, quota_gb: Option<u64>) -> Option<u64> {
    quota_gb.map(|q| quota_bytes(q).saturating_sub(used_bytes))
}
