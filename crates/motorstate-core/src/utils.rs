/*!
 * Utility functions and helpers for motorstate.
 */
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use tokio::time::timeout;

use crate::error::Error;

/// Run a future with a timeout
///
/// # Arguments
///
/// * `duration` - The timeout duration
/// * `future` - The future to run
///
/// # Returns
///
/// The result of the future, or a timeout error if the timeout is reached
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(format!(
            "Operation timed out after {} ms",
            duration_to_millis(duration)
        ))
        .into()),
    }
}

/// Convert a Duration to milliseconds
pub fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_secs() * 1000 + u64::from(duration.subsec_millis())
}

/// Convert milliseconds to an optional Duration, where 0 means "no limit"
pub fn millis_to_limit(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

/// Format a timestamp as the second-resolution file suffix `YYYYMMDD_HHMMSS`
pub fn timestamp_suffix<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, Error>(42)
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_millis_to_limit() {
        assert_eq!(millis_to_limit(0), None);
        assert_eq!(millis_to_limit(1500), Some(Duration::from_millis(1500)));
        assert_eq!(duration_to_millis(Duration::from_millis(1234)), 1234);
    }

    #[test]
    fn test_timestamp_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(timestamp_suffix(&at), "20240309_070502");
    }
}
