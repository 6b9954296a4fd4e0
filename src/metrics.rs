//! Metrics observer
//!
//! A pluggable, best-effort observer the runner and executor notify about
//! steps, tool executions, and whole runs. The default collector does
//! nothing.

use std::time::Duration;

use crate::error::ErrorCode;
use crate::types::Step;

/// Observer for runtime measurements. Implementations must not fail and
/// should return quickly.
pub trait MetricsCollector: Send + Sync {
    /// A step completed.
    fn record_step(&self, _step: &Step, _duration: Duration) {}

    /// A tool execution completed. `error` carries the failure message for
    /// unsuccessful executions.
    fn record_tool_execution(&self, _name: &str, _duration: Duration, _error: Option<&str>) {}

    /// A whole run completed.
    fn record_total_execution(&self, _steps: usize, _duration: Duration) {}

    /// A provider call (including its retries) completed.
    fn record_provider_call(&self, _provider: &str, _duration: Duration, _error: Option<ErrorCode>) {
    }
}

/// Collector that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {}
