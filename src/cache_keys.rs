//! Centralized cache key constants

/// Serialized snapshot of the last aggregated position list.
pub const POSITIONS_ALL: &str = "lp:positions:all";

/// Lifetime of the positions snapshot in seconds.
pub const POSITIONS_TTL_SECS: u64 = 600;
