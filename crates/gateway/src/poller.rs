//! Cooperative polling loop for asynchronous animation tasks, written as a
//! retry combinator over (interval, max checks, terminal-status predicate)
//! so it can be driven with a zero interval and scripted statuses in tests.

use std::future::Future;
use std::time::Duration;

use crate::{GatewayError, TaskStatus};

#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Minimum spacing between status checks.
    pub interval: Duration,
    /// Total check budget; exhausting it is the `TaskTimeout` terminal state.
    pub max_checks: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        // 120 checks at 5 s apart, roughly 10 minutes wall-clock.
        Self {
            interval: Duration::from_secs(5),
            max_checks: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollSuccess {
    pub video_url: String,
    pub checks: u32,
}

/// Drive a task to a terminal state.
///
/// Pending/running responses update the caller's progress (monotone, capped
/// at 90 while running) and continue. A `Failed` status or an `error` field
/// terminates immediately. A transport error on an individual check consumes
/// a check but does not terminate the loop.
pub async fn poll_task<F, Fut>(
    config: &PollConfig,
    mut check: F,
    mut progress: impl FnMut(u8, String),
) -> Result<PollSuccess, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<TaskStatus, GatewayError>>,
{
    let mut last_percent: u8 = 0;
    let mut report = |percent: u8, line: String, last: &mut u8| {
        let percent = percent.max(*last);
        *last = percent;
        progress(percent, line);
    };

    for attempt in 1..=config.max_checks {
        if !config.interval.is_zero() {
            tokio::time::sleep(config.interval).await;
        }

        match check().await {
            Err(err) => {
                log::warn!("status check {attempt} failed: {err}");
                report(
                    last_percent,
                    format!("Status check failed (check {attempt}): {err}"),
                    &mut last_percent,
                );
            }
            Ok(TaskStatus::Pending) => {
                report(
                    10,
                    format!("Task is pending in queue (check {attempt})"),
                    &mut last_percent,
                );
            }
            Ok(TaskStatus::Running) => {
                let percent = (15 + attempt.saturating_mul(2)).min(90) as u8;
                report(
                    percent,
                    format!("Task is running (check {attempt})"),
                    &mut last_percent,
                );
            }
            Ok(TaskStatus::Done(Some(url))) => {
                report(100, "Task completed successfully".to_string(), &mut last_percent);
                return Ok(PollSuccess {
                    video_url: url,
                    checks: attempt,
                });
            }
            Ok(TaskStatus::Done(None)) => {
                return Err(GatewayError::TaskFailed(
                    "no video URL in completed task result".to_string(),
                ));
            }
            Ok(TaskStatus::Failed(msg)) => {
                return Err(GatewayError::TaskFailed(msg));
            }
        }
    }

    Err(GatewayError::TaskTimeout {
        checks: config.max_checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn instant_config(max_checks: u32) -> PollConfig {
        PollConfig {
            interval: Duration::ZERO,
            max_checks,
        }
    }

    fn scripted(
        steps: Vec<Result<TaskStatus, GatewayError>>,
    ) -> impl FnMut() -> std::future::Ready<Result<TaskStatus, GatewayError>> {
        let queue = Arc::new(Mutex::new(VecDeque::from(steps)));
        move || {
            let next = queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TaskStatus::Running));
            std::future::ready(next)
        }
    }

    #[tokio::test]
    async fn test_completes_after_exactly_four_checks() {
        let check = scripted(vec![
            Ok(TaskStatus::Pending),
            Ok(TaskStatus::Running),
            Ok(TaskStatus::Running),
            Ok(TaskStatus::Done(Some("http://host/clip.mp4".into()))),
        ]);

        let mut percents = Vec::new();
        let result = poll_task(&instant_config(120), check, |p, _| percents.push(p))
            .await
            .unwrap();

        assert_eq!(result.checks, 4);
        assert_eq!(result.video_url, "http://host/clip.mp4");
        assert_eq!(*percents.last().unwrap(), 100);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "progress must be monotone");
    }

    #[tokio::test]
    async fn test_transient_transport_error_does_not_abort() {
        let check = scripted(vec![
            Ok(TaskStatus::Pending),
            Err(GatewayError::Transport("connection reset".into())),
            Ok(TaskStatus::Running),
            Ok(TaskStatus::Done(Some("http://host/clip.mp4".into()))),
        ]);

        let result = poll_task(&instant_config(120), check, |_, _| {}).await.unwrap();
        assert_eq!(result.checks, 4);
    }

    #[tokio::test]
    async fn test_never_done_exhausts_budget_as_timeout() {
        let check = || std::future::ready(Ok(TaskStatus::Running));
        let err = poll_task(&instant_config(120), check, |_, _| {})
            .await
            .unwrap_err();
        match err {
            GatewayError::TaskTimeout { checks } => assert_eq!(checks, 120),
            other => panic!("expected timeout, got {other}"),
        }
        assert!(err.to_string().contains("120 status checks"));
    }

    #[tokio::test]
    async fn test_error_status_terminates_immediately() {
        let check = scripted(vec![
            Ok(TaskStatus::Running),
            Ok(TaskStatus::Failed("out of credits".into())),
            Ok(TaskStatus::Done(Some("http://host/never.mp4".into()))),
        ]);
        let err = poll_task(&instant_config(120), check, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TaskFailed(msg) if msg == "out of credits"));
    }

    #[tokio::test]
    async fn test_done_without_result_is_failure() {
        let check = scripted(vec![Ok(TaskStatus::Done(None))]);
        let err = poll_task(&instant_config(120), check, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn test_running_progress_is_capped_at_ninety() {
        let check = || std::future::ready(Ok(TaskStatus::Running));
        let mut max_seen = 0u8;
        let _ = poll_task(&instant_config(60), check, |p, _| max_seen = max_seen.max(p)).await;
        assert_eq!(max_seen, 90);
    }
}
