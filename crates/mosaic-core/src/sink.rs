//! Error reporting seam.

use std::fmt;

use parking_lot::Mutex;

/// How bad a reported error is for the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The affected slot stays empty, the page keeps working.
    NonCritical,
    /// The page cannot be shown as composed.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonCritical => write!(f, "non-critical"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A classified error on its way out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    /// Component that observed the error (e.g. `guard`, `lifecycle`).
    pub origin: &'static str,
    /// Rendered error message.
    pub message: String,
    /// Severity.
    pub severity: Severity,
    /// Application involved, if any.
    pub app: Option<String>,
    /// Slot involved, if any.
    pub slot: Option<String>,
    /// Extra context.
    pub fields: Vec<(String, String)>,
}

impl ErrorReport {
    /// Create a non-critical report.
    pub fn new(origin: &'static str, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
            severity: Severity::NonCritical,
            app: None,
            slot: None,
            fields: Vec::new(),
        }
    }

    /// Set the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the application.
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Set the slot.
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Add a context field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Get a context field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether this report is critical.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Destination for classified errors.
pub trait ErrorSink: Send + Sync {
    /// Record an error.
    fn report(&self, report: &ErrorReport);

    /// Hand a critical error to the page-level fallback.
    fn escalate(&self, report: &ErrorReport) {
        let _ = report;
    }
}

/// Sink that keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingErrorSink {
    reports: Mutex<Vec<ErrorReport>>,
    escalated: Mutex<Vec<ErrorReport>>,
}

impl CollectingErrorSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }

    /// Reports escalated so far.
    pub fn escalated(&self) -> Vec<ErrorReport> {
        self.escalated.lock().clone()
    }
}

impl ErrorSink for CollectingErrorSink {
    fn report(&self, report: &ErrorReport) {
        self.reports.lock().push(report.clone());
    }

    fn escalate(&self, report: &ErrorReport) {
        self.escalated.lock().push(report.clone());
    }
}
