use chrono::{DateTime, Utc};

/// Second-level-truncated equality: two timestamps are "equal" iff their
/// integer-second epoch values match. Tolerates sub-second jitter upstream.
pub fn seconds_equal(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp() == b.timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tolerates_sub_second_jitter() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_000_000, 900_000_000).unwrap();
        assert!(seconds_equal(a, b));
    }

    #[test]
    fn detects_whole_second_change() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert!(!seconds_equal(a, b));
    }
}
