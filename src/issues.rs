//! Structured findings accumulated during graph analysis and solving.
//!
//! Issues are collected in flat lists and returned alongside the result set;
//! the caller (exporter layer) decides how to surface them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single finding. `scenario`/`period` are set when the finding belongs to
/// one (scenario, period) pair rather than to the shared model analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    pub scenario: Option<String>,
    pub period: Option<String>,
}

impl Issue {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            scenario: None,
            period: None,
        }
    }

    /// Tags the issue with the (scenario, period) pair it belongs to.
    pub fn tagged(mut self, scenario: &str, period: &str) -> Self {
        self.scenario = Some(scenario.to_string());
        self.period = Some(period.to_string());
        self
    }
}
