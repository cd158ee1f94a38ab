//! Hard caps protecting the engine from runaway inputs.

use crate::model::Ms;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SEAT_CODE_LEN: usize = 64;
pub const MAX_REASON_LEN: usize = 512;

pub const MAX_SLOTS_PER_SEAT: usize = 100_000;
pub const MAX_GENERATION_DAYS: i64 = 366;
pub const MAX_PAGE_LIMIT: usize = 500;

/// 2000-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// A single slot never spans more than a day.
pub const MAX_SPAN_DURATION_MS: Ms = 24 * 60 * 60 * 1000;
/// Availability queries are capped at a 92-day window.
pub const MAX_QUERY_WINDOW_MS: Ms = 92 * 24 * 60 * 60 * 1000;
