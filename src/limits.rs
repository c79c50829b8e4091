use crate::model::Ms;

/// Credits granted to every newly registered account.
pub const STARTING_CREDITS: u32 = 2;

/// Credits spent by a student per booked session.
pub const BOOKING_COST: u32 = 1;

/// How many times a failed booking retries its compensating refund.
pub const REFUND_ATTEMPTS: usize = 3;

pub const MAX_ACCOUNTS: usize = 1_000_000;
pub const MAX_LISTINGS_PER_TEACHER: usize = 100;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 4_000;
pub const MAX_PREFERENCE_LEN: usize = 50;
pub const MAX_REASON_LEN: usize = 500;

pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const MAX_DURATION_MINUTES: u32 = 480;

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const MAX_LEADERBOARD_SIZE: usize = 100;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
