use chrono::{DateTime, Datelike, Timelike, Utc};

/// Current time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// ISO weekday as `0..=6`, Monday = 0, matching `DemandPattern::weekday`.
pub fn weekday_index(ts: DateTime<Utc>) -> u8 {
    ts.weekday().num_days_from_monday() as u8
}

pub fn hour_of_day(ts: DateTime<Utc>) -> u8 {
    ts.hour() as u8
}

pub fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekday_monday_is_zero() {
        // 2026-08-03 is a Monday.
        let ts = Utc.with_ymd_and_hms(2026, 8, 3, 14, 0, 0).unwrap();
        assert_eq!(weekday_index(ts), 0);
        assert_eq!(hour_of_day(ts), 14);
    }
}
