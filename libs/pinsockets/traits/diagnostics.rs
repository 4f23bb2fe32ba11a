/// Severity of a diagnostics record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    Debug,
    Warn,
    Error,
}

/// Receiver for connection lifecycle diagnostics
///
/// The client never owns a global logger. Whatever sink is injected through
/// the builder receives one record per lifecycle step (connect attempt,
/// open, failure, scheduled reconnect, close).
pub trait DiagnosticsSink: Send + Sync {
    fn record(&self, level: DiagnosticLevel, message: &str);
}

/// Sink that drops every record (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn record(&self, _level: DiagnosticLevel, _message: &str) {}
}

/// Sink that forwards records to `tracing` under the `pinsockets::diagnostics` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn record(&self, level: DiagnosticLevel, message: &str) {
        match level {
            DiagnosticLevel::Debug => tracing::debug!(target: "pinsockets::diagnostics", "{}", message),
            DiagnosticLevel::Warn => tracing::warn!(target: "pinsockets::diagnostics", "{}", message),
            DiagnosticLevel::Error => tracing::error!(target: "pinsockets::diagnostics", "{}", message),
        }
    }
}
