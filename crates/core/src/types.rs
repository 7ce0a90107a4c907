//! Identifier and time aliases shared by every crate.

use chrono::{NaiveDate, NaiveTime};

/// Surrogate key of every table (`BIGSERIAL`).
pub type DbId = i64;

/// Timezone-aware instant, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> Timestamp {
    date.and_time(NaiveTime::MIN).and_utc()
}
