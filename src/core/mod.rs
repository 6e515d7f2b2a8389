pub mod privacy;
pub mod viewer;
pub mod visibility;

pub use privacy::Privacy;
pub use viewer::ViewerContext;
pub use visibility::{can_view_post, effective_privacy};

/// Current time in milliseconds since Unix epoch.
pub fn current_time_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// UTC day bucket for a millisecond timestamp, used by view statistics.
pub fn day_bucket(millis: i64) -> chrono::NaiveDate {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .date_naive()
}
