use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};

/// Builder for ensemble telemetry sinks.
pub struct EnsembleTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    sinks: Vec<Arc<dyn LogSink>>,
    min_level: LogLevel,
}

impl EnsembleTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            sinks: Vec::new(),
            min_level: LogLevel::Debug,
        }
    }

    /// Appends JSON lines to the file at `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Forwards records to an additional sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Builds the telemetry handle, opening the log file if one was set.
    pub fn build(self) -> Result<EnsembleTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::new(path)?));
        }
        Ok(EnsembleTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sinks,
                min_level: self.min_level,
            }),
        })
    }
}

/// Telemetry handle shared by ensemble components.
#[derive(Clone)]
pub struct EnsembleTelemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    module: String,
    sinks: Vec<Arc<dyn LogSink>>,
    min_level: LogLevel,
}

impl fmt::Debug for EnsembleTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnsembleTelemetry")
            .field("module", &self.inner.module)
            .field("sinks", &self.inner.sinks.len())
            .field("min_level", &self.inner.min_level)
            .finish()
    }
}

impl EnsembleTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> EnsembleTelemetryBuilder {
        EnsembleTelemetryBuilder::new(module)
    }

    /// Module label stamped on every record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs structured metadata to every sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if level < self.inner.min_level || self.inner.sinks.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        for sink in &self.inner.sinks {
            sink.write(&record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_logging::MemoryLogger;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_file_and_sink() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ensemble.log");
        let memory = Arc::new(MemoryLogger::new());
        let telemetry = EnsembleTelemetry::builder("ensemble")
            .log_path(&path)
            .sink(memory.clone())
            .build()
            .unwrap();
        assert_eq!(telemetry.module(), "ensemble");
        telemetry
            .log(LogLevel::Info, "ensemble_constructed", json!({ "members": 3 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("ensemble_constructed"));
        let records = memory.find("ensemble_constructed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module, "ensemble");
        assert_eq!(records[0].metadata["members"], json!(3));
    }

    #[test]
    fn records_below_threshold_are_dropped() {
        let memory = Arc::new(MemoryLogger::new());
        let telemetry = EnsembleTelemetry::builder("ensemble")
            .sink(memory.clone())
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "ensemble_predict", json!({}))
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "ensemble_unsupported_operation", json!({}))
            .unwrap();
        let messages: Vec<String> = memory.snapshot().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["ensemble_unsupported_operation".to_string()]);
    }
}
