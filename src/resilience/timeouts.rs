//! Per-attempt deadlines.
//!
//! An expired deadline is a transport timeout: it is classified and recorded
//! like any other transient failure before the call moves on.

use std::future::Future;
use std::time::Duration;

use crate::transport::{DownstreamResponse, TransportFault};

/// Run one attempt, bounded by `deadline` when set.
pub async fn with_deadline<F>(deadline: Option<Duration>, attempt: F) -> Result<DownstreamResponse, TransportFault>
where
    F: Future<Output = Result<DownstreamResponse, TransportFault>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportFault::Timeout(limit)),
        },
        None => attempt.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(DownstreamResponse::new(StatusCode::OK, "late"))
        };
        let result = with_deadline(Some(Duration::from_secs(1)), slow).await;
        assert_eq!(result.unwrap_err(), TransportFault::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_no_deadline_passes_through() {
        let fast = async { Ok(DownstreamResponse::new(StatusCode::OK, "ok")) };
        let result = with_deadline(None, fast).await;
        assert_eq!(result.unwrap().status, StatusCode::OK);
    }
}
