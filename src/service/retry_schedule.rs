use crate::domain::webhook::{DeliveryUpdate, WebhookStatus, MAX_DELIVERY_ATTEMPTS};
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn production() -> Self {
        Self::from_secs(&[0, 60, 300, 1800, 7200])
    }

    pub fn test() -> Self {
        Self::from_secs(&[0, 5, 10, 15, 20])
    }

    pub fn from_flag(test_intervals: bool) -> Self {
        if test_intervals {
            Self::test()
        } else {
            Self::production()
        }
    }

    fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// `attempt` is 1-based; past the end of the table the last entry repeats.
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let idx = (attempt.max(1) as usize - 1).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or(Duration::ZERO)
    }
}

pub fn is_acknowledged(response_code: Option<i32>) -> bool {
    matches!(response_code, Some(code) if (200..300).contains(&code))
}

/// Folds one delivery attempt into the next log state.
pub fn classify_attempt(
    previous_attempts: i32,
    response_code: Option<i32>,
    response_body: Option<String>,
    schedule: &RetrySchedule,
    now: DateTime<Utc>,
) -> DeliveryUpdate {
    let attempts = previous_attempts + 1;

    let (status, next_retry_at) = if is_acknowledged(response_code) {
        (WebhookStatus::Success, None)
    } else if attempts >= MAX_DELIVERY_ATTEMPTS {
        (WebhookStatus::Failed, None)
    } else {
        let delay = chrono::Duration::from_std(schedule.delay_for(attempts))
            .unwrap_or_else(|_| chrono::Duration::zero());
        (WebhookStatus::Pending, Some(now + delay))
    };

    DeliveryUpdate {
        status,
        attempts,
        last_attempt_at: now,
        response_code,
        response_body,
        next_retry_at,
    }
}
