//! Hard bounds enforced at the mutation layer.

/// Maximum length of an instructor remark on a verified lesson.
pub const MAX_REMARK_LEN: usize = 1024;

/// Maximum length of a student/instructor display name.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum bookings accepted in one wizard batch submission.
pub const MAX_BATCH_SIZE: usize = 64;

/// Maximum required lessons per category in a wizard plan.
pub const MAX_REQUIRED_PER_CATEGORY: u32 = 100;

/// Provisional reservations expire this long after batch completion.
pub const RESERVATION_WINDOW_MINUTES: i64 = 10;

/// How often the background sweep looks for expired provisional bookings.
pub const REAPER_INTERVAL_SECS: u64 = 30;
