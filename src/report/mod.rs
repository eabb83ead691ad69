//! Result aggregation and serializable reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Suite;
use crate::error::{AuditError, Result};
use crate::runner::{ResultCode, TestResult};

/// Count of results per code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub omitted: usize,
}

impl Summary {
    /// Count the results of a run
    ///
    /// Omitted entries are part of the list, so the counts always add up to
    /// the number of submitted tests.
    pub fn from_results(results: &[TestResult]) -> Self {
        results.iter().fold(Self::default(), |mut summary, result| {
            match result.result {
                ResultCode::Pass => summary.passed += 1,
                ResultCode::Fail => summary.failed += 1,
                ResultCode::Warning => summary.warnings += 1,
                ResultCode::Omitted => summary.omitted += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.warnings + self.omitted
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Entry of the report sent to an external mailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadEntry {
    pub name: String,
    pub value: ResultCode,
    pub data: Option<String>,
}

/// A complete audit run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub suite: Suite,
    /// Target with credentials hidden
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: Summary,
    pub results: Vec<TestResult>,
}

impl AuditReport {
    /// Assemble a report
    ///
    /// # Arguments
    /// * `suite` - Suite that ran
    /// * `target` - Sanitized connection string
    /// * `started_at` - Start of the run
    /// * `results` - One result per submitted test
    pub fn new(
        suite: Suite,
        target: String,
        started_at: DateTime<Utc>,
        results: Vec<TestResult>,
    ) -> Self {
        Self {
            suite,
            target,
            started_at,
            finished_at: Utc::now(),
            summary: Summary::from_results(&results),
            results,
        }
    }

    /// Per-test `name`/`value`/`data` triples
    ///
    /// Library API for an external report sender (e.g. a mailer); the
    /// binary itself prints the full report instead.
    pub fn email_payload(&self) -> Vec<PayloadEntry> {
        self.results
            .iter()
            .map(|result| PayloadEntry {
                name: result.id.clone(),
                value: result.result,
                data: result.extra.clone(),
            })
            .collect()
    }

    /// Run duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Serialize as JSON
    ///
    /// # Arguments
    /// * `pretty` - Indent the output
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        json.map_err(|e| AuditError::Generic(e.to_string()))
    }
}
