//! Retry - Bounded exponential backoff
//!
//! A `RetryPolicy` describes how many attempts an operation gets and how long
//! to wait between them. `RetryPolicy::run` drives any async operation under
//! that policy, retrying only the errors a caller-supplied predicate marks as
//! transient. Attempts are strictly sequential, no jitter is applied and there
//! is no deadline beyond the attempt budget.

use std::future::Future;
use std::time::Duration;

use crate::provider::BoxFuture;

/// Something that can wait for a duration
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Why a retried operation ultimately failed
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// An attempt failed with an error that is not worth retrying
    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The underlying error of the last attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Doubling backoff starting at `base_delay`
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2,
        }
    }

    pub const fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// The waits between consecutive attempts, one fewer than `max_attempts`
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let waits = self.max_attempts.saturating_sub(1) as usize;
        std::iter::successors(Some(self.base_delay), move |d| {
            Some(d.saturating_mul(self.multiplier))
        })
        .take(waits)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget runs out
    pub async fn run<T, E, F, Fut, P>(
        &self,
        sleeper: &dyn Sleeper,
        is_transient: P,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        let mut delay = self.base_delay;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_transient(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    log::debug!(
                        "attempt {}/{} failed with transient error, retrying in {:?}: {}",
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    sleeper.sleep(delay).await;
                    delay = delay.saturating_mul(self.multiplier);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn slept(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
            self.slept.lock().unwrap().push(duration);
            Box::pin(async {})
        }
    }

    const POLICY: RetryPolicy = RetryPolicy::new(8, Duration::from_millis(1000));

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    fn not_up(e: &String) -> bool {
        e.contains("is not up")
    }

    /// Fails transiently `failures` times, then succeeds
    async fn run_with_failures(
        failures: u32,
        sleeper: &RecordingSleeper,
    ) -> (Result<u32, RetryError<String>>, u32) {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = POLICY
            .run(sleeper, not_up, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    Err("gateway gw1 is not up".to_string())
                } else {
                    Ok(n)
                }
            })
            .await;
        (result, counter.load(Ordering::SeqCst))
    }

    #[test]
    fn delays_double_from_base() {
        let delays: Vec<Duration> = POLICY.delays().collect();
        assert_eq!(delays, secs(&[1, 2, 4, 8, 16, 32, 64]));
    }

    #[test]
    fn delays_respect_multiplier() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).with_multiplier(3);
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(900)
            ]
        );
    }

    #[tokio::test]
    async fn succeeds_without_sleeping() {
        let sleeper = RecordingSleeper::default();
        let (result, calls) = run_with_failures(0, &sleeper).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        for failures in 1..=7u32 {
            let sleeper = RecordingSleeper::default();
            let (result, calls) = run_with_failures(failures, &sleeper).await;
            assert_eq!(result.unwrap(), failures + 1);
            assert_eq!(calls, failures + 1);
            let expected: Vec<Duration> = POLICY.delays().take(failures as usize).collect();
            assert_eq!(sleeper.slept(), expected);
        }
    }

    #[tokio::test]
    async fn persistent_transient_failure_exhausts() {
        let sleeper = RecordingSleeper::default();
        let (result, calls) = run_with_failures(u32::MAX, &sleeper).await;
        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(calls, 8);
        assert_eq!(sleeper.slept(), secs(&[1, 2, 4, 8, 16, 32, 64]));
        assert_eq!(
            err.to_string(),
            "retries exhausted after 8 attempts: gateway gw1 is not up"
        );
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let sleeper = RecordingSleeper::default();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = POLICY
            .run(&sleeper, not_up, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("invalid account name".to_string())
            })
            .await;
        let err = result.unwrap_err();
        assert!(!err.is_exhausted());
        assert_eq!(err.into_inner(), "invalid account name");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_after_transient_keeps_earlier_sleeps() {
        let sleeper = RecordingSleeper::default();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = POLICY
            .run(&sleeper, not_up, move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err("gw is not up".to_string()),
                    _ => Err("quota exceeded".to_string()),
                }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Permanent(ref e)) if e == "quota exceeded"));
        assert_eq!(sleeper.slept(), secs(&[1, 2]));
    }

    #[tokio::test]
    async fn tokio_sleeper_waits() {
        let started = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_millis(5)).await;
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
