use chrono::{DateTime, FixedOffset, Utc};

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a millisecond Unix timestamp as RFC 3339 in JST.
///
/// Out-of-range values fall back to the raw number.
pub fn timestamp_to_jst_rfc3339(millis: i64) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(millis) else {
        return millis.to_string();
    };
    match FixedOffset::east_opt(JST_OFFSET_SECS) {
        Some(jst) => utc.with_timezone(&jst).to_rfc3339(),
        None => utc.to_rfc3339(),
    }
}

/// UTC calendar day (`YYYY-MM-DD`), used to bucket daily counters.
pub fn utc_day() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
