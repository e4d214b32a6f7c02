//! Structured logging with page and fragment context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Log level for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn label(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One structured log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Page view the entry belongs to.
    pub page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    /// Microseconds since the page logger was created.
    pub elapsed_us: u64,
}

impl LogEntry {
    /// One JSON object per line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }

    /// `[LEVEL] message (app@slot) | key=value ...`
    pub fn to_human(&self) -> String {
        let mut line = format!("[{}] {}", self.level, self.message);

        let unit = match (&self.app, &self.slot) {
            (Some(app), Some(slot)) => Some(format!("{}@{}", app, slot)),
            (Some(app), None) => Some(app.clone()),
            (None, Some(slot)) => Some(format!("@{}", slot)),
            (None, None) => None,
        };
        if let Some(unit) = unit {
            line.push_str(&format!(" ({})", unit));
        }

        if !self.fields.is_empty() {
            let fields: Vec<String> = self.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            line.push_str(" | ");
            line.push_str(&fields.join(" "));
        }

        line
    }
}

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Human,
}

/// Shared in-memory copy of emitted entries.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<LogEntry>>>);

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.0.lock().clone()
    }
}

/// Logger scoped to a page view, optionally narrowed to a route or a unit.
///
/// Entries are rendered in the configured format and emitted as `tracing`
/// events on the `mosaic` target.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    page: String,
    route: Option<String>,
    app: Option<String>,
    slot: Option<String>,
    created: Instant,
    min_level: LogLevel,
    format: LogFormat,
    buffer: Option<LogBuffer>,
}

impl StructuredLogger {
    /// Create a logger for a page view.
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            route: None,
            app: None,
            slot: None,
            created: Instant::now(),
            min_level: LogLevel::Info,
            format: LogFormat::Json,
            buffer: None,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Keep a copy of every emitted entry.
    pub fn with_buffer(mut self, buffer: LogBuffer) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// A logger for one (application, slot) unit of this page.
    pub fn for_unit(&self, app: impl Into<String>, slot: impl Into<String>) -> Self {
        let mut logger = self.clone().with_app(app);
        logger.slot = Some(slot.into());
        logger
    }

    /// The page view this logger belongs to.
    pub fn page(&self) -> &str {
        &self.page
    }

    /// Start an entry at `level`.
    pub fn at(&self, level: LogLevel, message: impl Into<String>) -> LogBuilder<'_> {
        LogBuilder {
            logger: self,
            level,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Build the entry a call would emit, without emitting it.
    pub fn entry(&self, level: LogLevel, message: &str, fields: BTreeMap<String, Value>) -> LogEntry {
        LogEntry {
            level,
            message: message.to_string(),
            page: self.page.clone(),
            route: self.route.clone(),
            app: self.app.clone(),
            slot: self.slot.clone(),
            fields,
            elapsed_us: self.created.elapsed().as_micros() as u64,
        }
    }

    /// Render an entry in the configured format.
    pub fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Json => entry.to_json(),
            LogFormat::Human => entry.to_human(),
        }
    }

    /// Emit a prepared set of fields.
    pub fn emit(&self, level: LogLevel, message: &str, fields: BTreeMap<String, Value>) {
        if level < self.min_level {
            return;
        }

        let entry = self.entry(level, message, fields);
        let line = self.render(&entry);
        match level {
            LogLevel::Trace => tracing::trace!(target: "mosaic", "{}", line),
            LogLevel::Debug => tracing::debug!(target: "mosaic", "{}", line),
            LogLevel::Info => tracing::info!(target: "mosaic", "{}", line),
            LogLevel::Warn => tracing::warn!(target: "mosaic", "{}", line),
            LogLevel::Error => tracing::error!(target: "mosaic", "{}", line),
        }

        if let Some(buffer) = &self.buffer {
            buffer.0.lock().push(entry);
        }
    }
}

/// Fluent entry under construction. Nothing is logged until [`LogBuilder::emit`].
pub struct LogBuilder<'a> {
    logger: &'a StructuredLogger,
    level: LogLevel,
    message: String,
    fields: BTreeMap<String, Value>,
}

impl LogBuilder<'_> {
    /// Attach any serializable value.
    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    /// Attach a duration in milliseconds.
    pub fn elapsed(self, key: &str, duration: Duration) -> Self {
        self.field(key, duration.as_millis() as u64)
    }

    pub fn emit(self) {
        self.logger.emit(self.level, &self.message, self.fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_min_level_filters() {
        let buffer = LogBuffer::new();
        let logger = StructuredLogger::new("page-1")
            .with_min_level(LogLevel::Warn)
            .with_buffer(buffer.clone());

        logger.at(LogLevel::Info, "ignored").emit();
        logger.at(LogLevel::Warn, "kept").emit();

        let entries = buffer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }

    #[test]
    fn test_json_carries_unit_context() {
        let logger = StructuredLogger::new("page-1").with_route("news");
        let unit = logger.for_unit("navbar", "header");

        let mut fields = BTreeMap::new();
        fields.insert("effect".to_string(), json!("rerendered"));
        let entry = unit.entry(LogLevel::Info, "slot effect", fields);
        let parsed: Value = serde_json::from_str(&entry.to_json()).unwrap();

        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["page"], "page-1");
        assert_eq!(parsed["route"], "news");
        assert_eq!(parsed["app"], "navbar");
        assert_eq!(parsed["slot"], "header");
        assert_eq!(parsed["effect"], "rerendered");
    }

    #[test]
    fn test_human_format() {
        let logger = StructuredLogger::new("page-1").with_format(LogFormat::Human);
        let mut fields = BTreeMap::new();
        fields.insert("attempts".to_string(), json!(3));
        let entry = logger.for_unit("news", "body").entry(LogLevel::Error, "load failed", fields);

        assert_eq!(logger.render(&entry), "[ERROR] load failed (news@body) | attempts=3");
    }

    #[test]
    fn test_builder_fields() {
        let buffer = LogBuffer::new();
        let logger = StructuredLogger::new("page-1").with_buffer(buffer.clone());

        logger
            .at(LogLevel::Warn, "slow transition")
            .field("route", "news")
            .field("blockers", 2)
            .field("spinner", true)
            .elapsed("settle", Duration::from_millis(750))
            .emit();

        let entry = &buffer.entries()[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.fields["route"], json!("news"));
        assert_eq!(entry.fields["blockers"], json!(2));
        assert_eq!(entry.fields["spinner"], json!(true));
        assert_eq!(entry.fields["settle"], json!(750));
    }
}
