//! Hard caps protecting the shared store. These are operational guardrails,
//! not business rules — business policy lives in `ScheduleConfig`.

pub const MAX_VENUES: usize = 64;
pub const MAX_VENUE_NAME_LEN: usize = 256;

pub const MAX_BAND_NAME_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_NOTES_LEN: usize = 1024;
pub const MAX_REASON_LEN: usize = 512;
pub const MAX_CREATED_BY_LEN: usize = 128;
pub const MAX_MEMBERS_COUNT: u32 = 64;

/// Bookings retained per day shard, any status. A day has at most 29 slots;
/// the rest is cancelled/rejected history.
pub const MAX_BOOKINGS_PER_DAY: usize = 512;

pub const MAX_BLOCKS_PER_VENUE: usize = 1024;

/// How far ahead a booking may be placed, in days.
pub const MAX_ADVANCE_DAYS: i64 = 365;

/// Widest date range accepted by range queries.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;
