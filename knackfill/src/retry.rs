use crate::AutomationError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ATTEMPTS: usize = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Run `op` up to `max_attempts` times, retrying only when it fails with a stale element.
///
/// Any other error is returned immediately. When every attempt went stale the
/// result is [`AutomationError::RetryExhausted`] carrying `label`.
pub async fn retry_on_stale<T, F, Fut>(
    max_attempts: usize,
    delay: Duration,
    label: &str,
    mut op: F,
) -> Result<T, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AutomationError>>,
{
    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_stale() => {
                warn!(
                    "⚠️ Attempt {}/{} for {}: stale element, retrying",
                    attempt, max_attempts, label
                );
                if attempt < max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
    Err(AutomationError::RetryExhausted {
        label: label.to_string(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_stale_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = retry_on_stale(3, Duration::ZERO, "click", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AutomationError::StaleElement("detached".into()))
            } else {
                Ok("clicked")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "clicked");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_on_stale(3, Duration::ZERO, "click", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AutomationError::ElementNotFound("submit".into()))
        })
        .await;
        assert!(matches!(result, Err(AutomationError::ElementNotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_label_and_attempts() {
        let result: Result<(), _> = retry_on_stale(2, Duration::ZERO, "IMEI suggestion", || async {
            Err(AutomationError::StaleElement("detached".into()))
        })
        .await;
        match result {
            Err(AutomationError::RetryExhausted { label, attempts }) => {
                assert_eq!(label, "IMEI suggestion");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }
}
