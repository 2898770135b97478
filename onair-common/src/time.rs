//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// True when `since` lies at least `window` before `now`
pub fn is_older_than(since: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(since) >= window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[tokio::test]
    async fn test_now_successive_calls_advance() {
        let time1 = now();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let time2 = now();
        assert!(time2 > time1);
    }

    #[test]
    fn test_is_older_than_boundary_is_inclusive() {
        let t0 = now();
        let window = Duration::minutes(5);
        assert!(is_older_than(t0, window, t0 + Duration::minutes(5)));
        assert!(is_older_than(t0, window, t0 + Duration::minutes(6)));
        assert!(!is_older_than(t0, window, t0 + Duration::seconds(299)));
    }
}
