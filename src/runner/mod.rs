//! Test runner
//!
//! Runs an ordered test list against one executor, strictly one test after
//! the other. Each test moves from pending to running and ends either
//! completed or omitted:
//! - A test whose `breaks` equals the truthiness of its result stops the run.
//! - Tests left over after a stop or a cancellation are omitted without
//!   invoking their check.
//! - A check that errors or panics yields a failed result; the run goes on.
//! - The executor is closed exactly once before the results are returned.
//!
//! The result list therefore always has one entry per submitted test.

pub mod result;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::TestDefinition;
use crate::checks::CheckExecutor;
use crate::config::Config;
use crate::connection::Session;
use crate::error::mongo::extract_error_info;
use crate::error::{AuditError, Result};
use crate::uri::Credential;

pub use result::{CheckOutcome, OMITTED_MESSAGE, ResultCode, TestResult, resolve_message};

/// Observer notified as the run progresses
///
/// Observers only look; they never influence the run.
pub trait TestObserver: Send + Sync {
    /// Called right before a test's check runs
    fn on_test_starting(&self, test: &TestDefinition);

    /// Called once a test has a result, including omitted ones
    fn on_test_finished(&self, _result: &TestResult) {}
}

/// Observer that ignores everything
pub struct NullObserver;

impl TestObserver for NullObserver {
    fn on_test_starting(&self, _test: &TestDefinition) {}
}

/// Sequential, short-circuiting test runner
pub struct TestRunner {
    delay: Duration,
    observer: Arc<dyn TestObserver>,
    cancel_token: Option<CancellationToken>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            observer: Arc::new(NullObserver),
            cancel_token: None,
        }
    }
}

impl TestRunner {
    /// Create a runner without delay, observer, or cancellation
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pause between tests from the configuration
    pub fn with_config(mut self, config: &Config) -> Self {
        self.delay = config.audit.test_delay();
        self
    }

    /// Pause between two tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the progress observer
    pub fn with_observer(mut self, observer: Arc<dyn TestObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Stop starting new tests once `token` is cancelled
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Run `tests` in order and release the executor
    ///
    /// # Arguments
    /// * `executor` - Runs the checks; closed before this returns
    /// * `tests` - Ordered test list
    ///
    /// # Returns
    /// * `Vec<TestResult>` - Exactly one result per test, in input order
    pub async fn run<E>(&self, executor: &mut E, tests: &[TestDefinition]) -> Vec<TestResult>
    where
        E: CheckExecutor + ?Sized,
    {
        let mut results = self.execute(executor, tests).await;
        executor.close().await;

        let executed = results.len();
        for test in &tests[executed..] {
            let result = TestResult::omitted(test);
            self.observer.on_test_finished(&result);
            results.push(result);
        }

        info!(
            "Audit finished: {} of {} tests executed",
            executed,
            tests.len()
        );
        results
    }

    /// Execute tests until the list ends, a test breaks, or the run is cancelled
    async fn execute<E>(&self, executor: &mut E, tests: &[TestDefinition]) -> Vec<TestResult>
    where
        E: CheckExecutor + ?Sized,
    {
        let mut results = Vec::with_capacity(tests.len());

        for (index, test) in tests.iter().enumerate() {
            if self.is_cancelled() {
                warn!("Audit cancelled before test {}", test.id);
                break;
            }
            if index > 0 && !self.pause().await {
                warn!("Audit cancelled before test {}", test.id);
                break;
            }

            self.observer.on_test_starting(test);
            debug!("Running test {}", test.id);

            let started = Instant::now();
            let outcome = self.run_check(executor, test).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(outcome) => TestResult::completed(test, outcome, elapsed_ms),
                Err(message) => TestResult::failed_to_run(test, message, elapsed_ms),
            };
            debug!("Test {} {} in {}ms", test.id, result.result, elapsed_ms);
            self.observer.on_test_finished(&result);

            let stop = test.breaks == Some(result.result.is_truthy());
            results.push(result);
            if stop {
                info!("Test {} stopped the audit", test.id);
                break;
            }
        }

        results
    }

    /// Run one check; errors and panics come back as a failure message
    async fn run_check<E>(
        &self,
        executor: &mut E,
        test: &TestDefinition,
    ) -> std::result::Result<CheckOutcome, String>
    where
        E: CheckExecutor + ?Sized,
    {
        match AssertUnwindSafe(executor.execute(&test.check))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                error!("Test {} failed to run: {}", test.id, e);
                Err(failure_message(&e))
            }
            Err(_) => {
                error!("Test {} panicked", test.id);
                Err(format!("{FAILED_TO_RUN}."))
            }
        }
    }

    /// Sleep between tests; false if cancelled meanwhile
    async fn pause(&self) -> bool {
        if self.delay.is_zero() {
            return true;
        }
        match &self.cancel_token {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => true,
                    _ = token.cancelled() => false,
                }
            }
            None => {
                tokio::time::sleep(self.delay).await;
                true
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Prefix of the message of a test whose check broke
const FAILED_TO_RUN: &str = "The test could not be completed";

fn failure_message(error: &AuditError) -> String {
    let summary = match error {
        AuditError::MongoDb(e) => extract_error_info(e).summary(),
        other => other.to_string(),
    };
    format!("{FAILED_TO_RUN}: {summary}")
}

/// Audit a target with the default runner
///
/// # Arguments
/// * `credential` - Validated target
/// * `tests` - Ordered test list
/// * `config` - Connection and audit configuration
///
/// # Returns
/// * `Result<Vec<TestResult>>` - One result per test; an error only when no
///   session could be opened
pub async fn run_audit(
    credential: &Credential,
    tests: &[TestDefinition],
    config: &Config,
) -> Result<Vec<TestResult>> {
    let runner = TestRunner::new().with_config(config);
    let mut session = Session::connect(credential.clone(), config.connection.clone()).await?;
    Ok(runner.run(&mut session, tests).await)
}
