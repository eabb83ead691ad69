//! Result types shared by the checks and the runner

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{Severity, TestDefinition};

/// Message used for every test that did not run
pub const OMITTED_MESSAGE: &str = "This test was omitted because of a missing requirement \
     (e.g.: it depends on a previous test that failed).";

/// Message used when a check finished with a warning but gave no details
const WARNING_MESSAGE: &str = "This test finished with warnings.";

/// Outcome of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ResultCode {
    Fail = 0,
    Pass = 1,
    Warning = 2,
    Omitted = 3,
}

impl ResultCode {
    /// Truthiness used by `breaks`: only a failure is false
    pub fn is_truthy(self) -> bool {
        self != ResultCode::Fail
    }

    /// Map a yes/no answer to pass or fail
    pub fn from_bool(success: bool) -> Self {
        if success {
            ResultCode::Pass
        } else {
            ResultCode::Fail
        }
    }

    /// Position of the message template for this code
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for ResultCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultCode::Fail),
            1 => Ok(ResultCode::Pass),
            2 => Ok(ResultCode::Warning),
            3 => Ok(ResultCode::Omitted),
            other => Err(format!("unknown result code {other}")),
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> Self {
        code as u8
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Fail => write!(f, "failed"),
            ResultCode::Pass => write!(f, "passed"),
            ResultCode::Warning => write!(f, "warning"),
            ResultCode::Omitted => write!(f, "omitted"),
        }
    }
}

/// What a check reports back: a code and optional data for the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub code: ResultCode,
    pub extra: Option<String>,
}

impl CheckOutcome {
    pub fn new(code: ResultCode) -> Self {
        Self { code, extra: None }
    }

    pub fn pass() -> Self {
        Self::new(ResultCode::Pass)
    }

    pub fn fail() -> Self {
        Self::new(ResultCode::Fail)
    }

    pub fn omitted() -> Self {
        Self::new(ResultCode::Omitted)
    }

    pub fn warning(extra: impl Into<String>) -> Self {
        Self::new(ResultCode::Warning).with_extra(extra)
    }

    pub fn from_bool(success: bool) -> Self {
        Self::new(ResultCode::from_bool(success))
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Fully resolved result of one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(rename = "name")]
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub caption: String,
    pub message: String,
    pub result: ResultCode,
    #[serde(rename = "extra_data")]
    pub extra: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl TestResult {
    /// Build the result of a test that ran
    ///
    /// # Arguments
    /// * `test` - Definition of the test
    /// * `outcome` - What the check reported
    /// * `elapsed_ms` - Time spent in the check
    pub fn completed(test: &TestDefinition, outcome: CheckOutcome, elapsed_ms: u64) -> Self {
        let message = resolve_message(test, &outcome);
        Self {
            id: test.id.clone(),
            severity: test.severity,
            title: test.title.clone(),
            caption: test.caption.clone(),
            message,
            result: outcome.code,
            extra: outcome.extra,
            elapsed_ms,
        }
    }

    /// Build the result of a test whose check broke
    pub fn failed_to_run(test: &TestDefinition, message: String, elapsed_ms: u64) -> Self {
        Self {
            id: test.id.clone(),
            severity: test.severity,
            title: test.title.clone(),
            caption: test.caption.clone(),
            message,
            result: ResultCode::Fail,
            extra: None,
            elapsed_ms,
        }
    }

    /// Build the result of a test that never ran
    pub fn omitted(test: &TestDefinition) -> Self {
        Self {
            id: test.id.clone(),
            severity: test.severity,
            title: test.title.clone(),
            caption: test.caption.clone(),
            message: OMITTED_MESSAGE.to_string(),
            result: ResultCode::Omitted,
            extra: None,
            elapsed_ms: 0,
        }
    }
}

/// Pick the message for an outcome
///
/// The template at the outcome's code wins, with `{extra}` replaced by the
/// extra data. Without a template the extra data itself is the message, and
/// without either a fixed text for the code is used.
///
/// # Arguments
/// * `test` - Definition holding the message templates
/// * `outcome` - Code and extra data reported by the check
///
/// # Returns
/// * `String` - Message to display
pub fn resolve_message(test: &TestDefinition, outcome: &CheckOutcome) -> String {
    if let Some(template) = test.messages.get(outcome.code.index()) {
        return template.replace("{extra}", outcome.extra.as_deref().unwrap_or_default());
    }
    if let Some(extra) = &outcome.extra {
        return extra.clone();
    }
    match outcome.code {
        ResultCode::Warning => WARNING_MESSAGE.to_string(),
        _ => OMITTED_MESSAGE.to_string(),
    }
}
