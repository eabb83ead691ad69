//! Progress spinner for audit runs
//!
//! Draws one spinner line naming the test that is currently running. The
//! runner drives it through the [`TestObserver`] hooks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::TestDefinition;
use crate::runner::{TestObserver, TestResult};

/// Spinner observer for the test runner
pub struct ProgressObserver {
    /// Number of tests the run was given
    total: usize,
    /// Tests started so far
    started: AtomicUsize,
    /// Spinner (optional, can be disabled)
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    /// Create a new progress observer
    ///
    /// # Arguments
    /// * `total` - Number of tests in the run
    /// * `enable_bar` - Whether to draw the spinner
    ///
    /// # Returns
    /// * `Self` - New progress observer
    pub fn new(total: usize, enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.set_length(total as u64);
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });

        Self {
            total,
            started: AtomicUsize::new(0),
            bar,
        }
    }

    /// Number of tests started so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Relaxed)
    }

    /// Remove the spinner line
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl TestObserver for ProgressObserver {
    fn on_test_starting(&self, test: &TestDefinition) {
        let position = self.started.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(ref bar) = self.bar {
            bar.set_position(position.min(self.total) as u64);
            bar.set_message(test.title.clone());
        }
    }

    fn on_test_finished(&self, result: &TestResult) {
        if let Some(ref bar) = self.bar {
            bar.set_message(format!("{} ({})", result.title, result.result));
        }
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Suite};

    #[test]
    fn test_counts_started_tests_without_a_bar() {
        let tests = Catalog::builtin().unwrap().suite(Suite::Basic);
        let observer = ProgressObserver::new(tests.len(), false);

        for test in &tests {
            observer.on_test_starting(test);
        }

        assert_eq!(observer.started(), tests.len());
        observer.finish();
    }

    #[test]
    fn test_hidden_bar_accepts_updates() {
        let tests = Catalog::builtin().unwrap().suite(Suite::Basic);
        let observer = ProgressObserver::new(1, true);
        observer.on_test_starting(&tests[0]);
        observer.on_test_starting(&tests[1]);
        assert_eq!(observer.started(), 2);
    }
}
