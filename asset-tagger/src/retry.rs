use backoff::backoff::{Backoff, Constant};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How long to wait before retry `n` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffSchedule {
    /// `n * step`.
    Linear { step: Duration },
    Constant { interval: Duration },
}

impl BackoffSchedule {
    pub fn backoff(&self) -> Box<dyn Backoff + Send> {
        match *self {
            BackoffSchedule::Linear { step } => Box::new(LinearBackoff::new(step)),
            BackoffSchedule::Constant { interval } => Box::new(Constant::new(interval)),
        }
    }
}

/// Delay grows by one `step` per retry and never gives up on its own;
/// the attempt budget lives in [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step: Duration,
    retries: u32,
}

impl LinearBackoff {
    pub fn new(step: Duration) -> Self {
        Self { step, retries: 0 }
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.retries = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.retries += 1;
        Some(self.step * self.retries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause before every attempt, the first one included.
    pub pre_attempt_delay: Duration,
    pub schedule: BackoffSchedule,
}

impl RetryPolicy {
    /// No waiting at all; used where the caller only wants the attempt budget.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            pre_attempt_delay: Duration::ZERO,
            schedule: BackoffSchedule::Constant { interval: Duration::ZERO },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug)]
pub struct RetryFailure<E> {
    pub error: E,
    pub attempts: Vec<AttemptRecord>,
    /// False when the last error was not retryable and the budget was left unspent.
    pub exhausted: bool,
}

impl<E> RetryFailure<E> {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Runs `op` until it succeeds, returns a non-retryable error, or the attempt
/// budget is spent. `op` receives the 1-based attempt number.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    is_retryable: R,
) -> std::result::Result<Retried<T>, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let mut backoff = policy.schedule.backoff();
    let mut attempts = Vec::new();
    let mut attempt = 0;

    loop {
        attempt += 1;

        if !policy.pre_attempt_delay.is_zero() {
            tokio::time::sleep(policy.pre_attempt_delay).await;
        }

        debug!("{}: attempt {}/{}", label, attempt, policy.max_attempts);

        match op(attempt).await {
            Ok(value) => {
                attempts.push(AttemptRecord { attempt, error: None });
                return Ok(Retried { value, attempts });
            }
            Err(error) => {
                attempts.push(AttemptRecord {
                    attempt,
                    error: Some(error.to_string()),
                });

                let retryable = is_retryable(&error);
                if !retryable || attempt >= policy.max_attempts {
                    return Err(RetryFailure {
                        error,
                        attempts,
                        exhausted: retryable,
                    });
                }

                let delay = backoff.next_backoff().unwrap_or(Duration::ZERO);
                warn!("{}: attempt {} failed ({}), retrying in {:?}", label, attempt, error, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
