use chrono::{DateTime, Utc};

/// Current wall-clock time in UTC.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds elapsed since `then`, saturating at zero for future timestamps.
#[must_use]
pub fn seconds_since(then: DateTime<Utc>) -> u64 {
    (Utc::now() - then).num_seconds().max(0) as u64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, chrono::Duration};

    #[test]
    fn seconds_since_past() {
        let then = now() - Duration::seconds(5);
        assert!(seconds_since(then) >= 5);
    }

    #[test]
    fn seconds_since_future_saturates() {
        let then = now() + Duration::seconds(60);
        assert_eq!(seconds_since(then), 0);
    }
}
