//! Retry wrapper for calls that cross a network boundary
//!
//! Explicit bounded loop: every error is retried until the attempts are
//! exhausted, and the last error is then returned as-is so callers can still
//! match on its variant.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};
use vlbench_kernel::retry::{RetryPolicy, Sleeper, TokioSleeper};
use vlbench_kernel::{BackendKind, GenerationError, Generator, ImageRef};

/// Runs an operation under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryWrapper {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryWrapper {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// Wrapper sleeping on the tokio timer
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::new(policy, Arc::new(TokioSleeper))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. The delay is slept between
    /// attempts only, so `n` attempts sleep `n - 1` times.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        T: Send,
        E: Display + Send,
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let max_attempts = self.policy.effective_attempts();
        let mut attempt = 1;

        loop {
            let span = tracing::info_span!("retry_attempt", operation, attempt, max_attempts);

            match op(attempt).instrument(span).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(err) if attempt < max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        operation, attempt, max_attempts, err, self.policy.delay
                    );
                    self.sleeper.sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "{} failed after {} attempts. Last error: {}",
                        operation, attempt, err
                    );
                    return Err(err);
                }
            }
        }
    }
}

/// Generator whose calls run under a [`RetryWrapper`]
pub struct RetryingGenerator {
    inner: Arc<dyn Generator>,
    retry: RetryWrapper,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn Generator>, retry: RetryWrapper) -> Self {
        Self { inner, retry }
    }

    pub fn inner(&self) -> &Arc<dyn Generator> {
        &self.inner
    }
}

#[async_trait]
impl Generator for RetryingGenerator {
    fn adapter_name(&self) -> &str {
        self.inner.adapter_name()
    }

    fn backend_kind(&self) -> BackendKind {
        self.inner.backend_kind()
    }

    async fn generate_response(
        &self,
        question: &str,
        image: &ImageRef,
    ) -> Result<String, GenerationError> {
        debug!(adapter = self.inner.adapter_name(), %image, "generate_response");
        let inner = &self.inner;
        self.retry
            .run("generate_response", move |_attempt| {
                inner.generate_response(question, image)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use vlbench_kernel::RemoteApiError;

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    /// Fails with a rate-limit error until `succeed_on`
    struct FlakyGenerator {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl Generator for FlakyGenerator {
        fn adapter_name(&self) -> &str {
            "FlakyResponseGenerator"
        }

        fn backend_kind(&self) -> BackendKind {
            BackendKind::HostedApi
        }

        async fn generate_response(
            &self,
            _question: &str,
            _image: &ImageRef,
        ) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(format!("answer from attempt {}", call))
            } else {
                Err(RemoteApiError::from_status(429, format!("attempt {}", call)).into())
            }
        }
    }

    fn wrapped(succeed_on: u32) -> (RetryingGenerator, Arc<FlakyGenerator>, Arc<RecordingSleeper>) {
        let flaky = Arc::new(FlakyGenerator {
            calls: AtomicU32::new(0),
            succeed_on,
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let retry = RetryWrapper::new(RetryPolicy::default(), sleeper.clone());
        (RetryingGenerator::new(flaky.clone(), retry), flaky, sleeper)
    }

    #[tokio::test]
    async fn success_on_fifth_attempt_sleeps_four_times() {
        let (generator, flaky, sleeper) = wrapped(5);
        let out = generator
            .generate_response("describe this", &ImageRef::new("img.png"))
            .await
            .unwrap();

        assert_eq!(out, "answer from attempt 5");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 5);
        assert_eq!(*sleeper.delays.lock().unwrap(), vec![Duration::from_secs(30); 4]);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error_unchanged() {
        let (generator, flaky, sleeper) = wrapped(u32::MAX);
        let err = generator
            .generate_response("describe this", &ImageRef::new("img.png"))
            .await
            .unwrap_err();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 5);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 4);
        match err {
            GenerationError::RemoteApi(RemoteApiError::RateLimit { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "attempt 5");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let (generator, flaky, sleeper) = wrapped(1);
        generator
            .generate_response("q", &ImageRef::new("img.png"))
            .await
            .unwrap();
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn attempt_numbers_are_one_based() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let retry = RetryWrapper::new(RetryPolicy::new(3, Duration::from_millis(5)), sleeper);
        let mut seen = Vec::new();
        let result: Result<(), String> = retry
            .run("count_attempts", |attempt| {
                seen.push(attempt);
                async move { Err(format!("no luck on {}", attempt)) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "no luck on 3");
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
