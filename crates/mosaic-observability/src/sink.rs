//! Error sink that writes classified errors to the structured log.

use std::collections::BTreeMap;

use mosaic_core::{ErrorReport, ErrorSink};

use crate::logging::{LogLevel, StructuredLogger};

/// [`ErrorSink`] backed by a [`StructuredLogger`].
///
/// Non-critical reports are logged at warn, critical ones at error.
/// Escalations are always logged at error with `escalated=true`.
#[derive(Debug, Clone)]
pub struct LoggingErrorSink {
    logger: StructuredLogger,
}

impl LoggingErrorSink {
    /// Create a sink writing through `logger`.
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    /// The underlying logger.
    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    fn write(&self, level: LogLevel, report: &ErrorReport, escalated: bool) {
        let mut fields = BTreeMap::new();
        fields.insert("origin".to_string(), serde_json::json!(report.origin));
        fields.insert("severity".to_string(), serde_json::json!(report.severity.to_string()));
        for (key, value) in &report.fields {
            fields.insert(key.clone(), serde_json::json!(value));
        }
        if escalated {
            fields.insert("escalated".to_string(), serde_json::json!(true));
        }

        let logger = match (&report.app, &report.slot) {
            (Some(app), Some(slot)) => self.logger.for_unit(app, slot),
            (Some(app), None) => self.logger.clone().with_app(app),
            _ => self.logger.clone(),
        };
        logger.emit(level, &report.message, fields);
    }
}

impl ErrorSink for LoggingErrorSink {
    fn report(&self, report: &ErrorReport) {
        let level = if report.is_critical() {
            LogLevel::Error
        } else {
            LogLevel::Warn
        };
        self.write(level, report, false);
    }

    fn escalate(&self, report: &ErrorReport) {
        self.write(LogLevel::Error, report, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogBuffer;
    use mosaic_core::Severity;

    fn sink() -> (LoggingErrorSink, LogBuffer) {
        let buffer = LogBuffer::new();
        let logger = StructuredLogger::new("page-1").with_buffer(buffer.clone());
        (LoggingErrorSink::new(logger), buffer)
    }

    #[test]
    fn test_non_critical_report_is_a_warning() {
        let (sink, buffer) = sink();

        sink.report(
            &ErrorReport::new("lifecycle", "mount failed")
                .with_app("navbar")
                .with_slot("header"),
        );

        let entry = &buffer.entries()[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.app.as_deref(), Some("navbar"));
        assert_eq!(entry.slot.as_deref(), Some("header"));
        assert_eq!(entry.fields["origin"], serde_json::json!("lifecycle"));
        assert_eq!(entry.fields["severity"], serde_json::json!("non-critical"));
    }

    #[test]
    fn test_critical_report_and_escalation() {
        let (sink, buffer) = sink();
        let report = ErrorReport::new("lifecycle", "primary failed")
            .with_severity(Severity::Critical)
            .with_app("news")
            .with_field("kind", "primary");

        sink.report(&report);
        sink.escalate(&report);

        let entries = buffer.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert!(!entries[0].fields.contains_key("escalated"));
        assert_eq!(entries[1].fields["escalated"], serde_json::json!(true));
        assert_eq!(entries[1].fields["kind"], serde_json::json!("primary"));
        assert_eq!(entries[1].slot, None);
    }
}
