//! Steps - Ordered, non-retried multi-step operations
//!
//! Some operations are a sequence of independent remote calls where each call
//! builds on objects the previous ones created. Steps run in the order they were
//! added and the first failure stops the sequence. Completed steps are never
//! rolled back, so the report tells the caller exactly how far the sequence got.

use std::future::Future;

use crate::provider::BoxFuture;

/// A step that failed, with the error it returned
#[derive(Debug)]
pub struct StepFailure<E> {
    pub step: &'static str,
    pub error: E,
}

/// Outcome of running a `StepSequence`
#[derive(Debug)]
pub struct SequenceReport<E> {
    /// Steps that finished successfully, in execution order
    pub completed: Vec<&'static str>,
    /// Steps that never ran because an earlier one failed
    pub skipped: Vec<&'static str>,
    pub failure: Option<StepFailure<E>>,
}

impl<E> SequenceReport<E> {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn last_completed(&self) -> Option<&'static str> {
        self.completed.last().copied()
    }

    pub fn into_result(self) -> Result<Vec<&'static str>, StepFailure<E>> {
        match self.failure {
            None => Ok(self.completed),
            Some(failure) => Err(failure),
        }
    }
}

/// An ordered list of named steps
pub struct StepSequence<'a, E> {
    steps: Vec<(&'static str, BoxFuture<'a, Result<(), E>>)>,
}

impl<E> Default for StepSequence<'_, E> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<'a, E> StepSequence<'a, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. The future is not polled until the sequence runs.
    pub fn step<Fut>(mut self, name: &'static str, fut: Fut) -> Self
    where
        Fut: Future<Output = Result<(), E>> + Send + 'a,
    {
        self.steps.push((name, Box::pin(fut)));
        self
    }

    /// Append a step only when `condition` holds
    pub fn step_if<F, Fut>(self, condition: bool, name: &'static str, make: F) -> Self
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'a,
    {
        if condition {
            self.step(name, make())
        } else {
            self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(name, _)| *name).collect()
    }

    /// Run every step in order, stopping at the first failure
    pub async fn run(self) -> SequenceReport<E> {
        let mut completed = Vec::new();
        let mut steps = self.steps.into_iter();
        while let Some((name, fut)) = steps.next() {
            if let Err(error) = fut.await {
                log::debug!("step '{}' failed, halting sequence", name);
                return SequenceReport {
                    completed,
                    skipped: steps.map(|(name, _)| name).collect(),
                    failure: Some(StepFailure { step: name, error }),
                };
            }
            log::debug!("step '{}' completed", name);
            completed.push(name);
        }
        SequenceReport {
            completed,
            skipped: Vec::new(),
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn runs_steps_in_order() {
        let log = Mutex::new(Vec::new());
        let log_ref = &log;
        let report: SequenceReport<String> = StepSequence::new()
            .step("first", async move {
                log_ref.lock().unwrap().push("first");
                Ok(())
            })
            .step("second", async move {
                log_ref.lock().unwrap().push("second");
                Ok(())
            })
            .run()
            .await;

        assert!(report.is_success());
        assert_eq!(report.completed, vec!["first", "second"]);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn failure_halts_remaining_steps() {
        let ran = AtomicBool::new(false);
        let ran_ref = &ran;
        let report = StepSequence::new()
            .step("approval", async { Ok(()) })
            .step("cidrs", async { Err("controller rejected cidrs".to_string()) })
            .step("prepend", async move {
                ran_ref.store(true, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert!(!ran.load(Ordering::SeqCst));
        assert!(!report.is_success());
        assert_eq!(report.last_completed(), Some("approval"));
        assert_eq!(report.skipped, vec!["prepend"]);
        let failure = report.into_result().unwrap_err();
        assert_eq!(failure.step, "cidrs");
        assert_eq!(failure.error, "controller rejected cidrs");
    }

    #[tokio::test]
    async fn step_if_skips_unrequested_steps() {
        let sequence: StepSequence<'_, String> = StepSequence::new()
            .step_if(false, "approval", || async { Ok(()) })
            .step_if(true, "event_ha", || async { Ok(()) });
        assert_eq!(sequence.names(), vec!["event_ha"]);

        let report = sequence.run().await;
        assert_eq!(report.into_result().unwrap(), vec!["event_ha"]);
    }

    #[tokio::test]
    async fn empty_sequence_succeeds() {
        let sequence: StepSequence<'_, String> = StepSequence::new();
        assert!(sequence.is_empty());
        assert!(sequence.run().await.is_success());
    }
}
