/*!
 * Telemetry sinks for long-running generative calls.
 *
 * A sink receives two kinds of signals, both tagged with an operation id:
 * heartbeats while a call is outstanding, and discrete events (attempts,
 * retries, failures). Sinks are passed explicitly to the gateway and runner,
 * so concurrent runs can report to different places.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub(crate) const TARGET: &str = "annotext::telemetry";

/// Severity of a telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Receiver of heartbeats and events.
pub trait Telemetry: Send + Sync {
    /// Periodic signal while a call is in flight; purely observational.
    fn heartbeat(&self, op_id: &str, elapsed: Duration, note: Option<&str>);

    /// Discrete event correlated to an operation.
    fn event(&self, op_id: &str, level: EventLevel, message: &str, data: Option<&Value>);
}

/// Generate a fresh operation id
pub fn new_op_id() -> String {
    format!("op-{}", uuid::Uuid::new_v4().simple())
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn heartbeat(&self, _op_id: &str, _elapsed: Duration, _note: Option<&str>) {}

    fn event(&self, _op_id: &str, _level: EventLevel, _message: &str, _data: Option<&Value>) {}
}

/// Sink that forwards to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn heartbeat(&self, op_id: &str, elapsed: Duration, note: Option<&str>) {
        match note {
            Some(note) => debug!(target: TARGET, "[heartbeat] {} +{:.1}s ({})", op_id, elapsed.as_secs_f64(), note),
            None => debug!(target: TARGET, "[heartbeat] {} +{:.1}s", op_id, elapsed.as_secs_f64()),
        }
    }

    fn event(&self, op_id: &str, level: EventLevel, message: &str, data: Option<&Value>) {
        let data = data.map(Value::to_string).unwrap_or_default();
        match level {
            EventLevel::Debug => debug!(target: TARGET, "{} {} {}", op_id, message, data),
            EventLevel::Info => info!(target: TARGET, "{} {} {}", op_id, message, data),
            EventLevel::Warn => warn!(target: TARGET, "{} {} {}", op_id, message, data),
            EventLevel::Error => error!(target: TARGET, "{} {} {}", op_id, message, data),
        }
    }
}

/// One recorded signal
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    Heartbeat {
        op_id: String,
        elapsed: Duration,
        note: Option<String>,
    },
    Event {
        op_id: String,
        level: EventLevel,
        message: String,
        data: Option<Value>,
    },
}

/// Sink that keeps every signal in memory, for tests and audits
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().clone()
    }

    pub fn heartbeat_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r, TelemetryRecord::Heartbeat { .. }))
            .count()
    }

    /// Events whose message contains `needle`
    pub fn events_matching(&self, needle: &str) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r, TelemetryRecord::Event { message, .. } if message.contains(needle)))
            .cloned()
            .collect()
    }
}

impl Telemetry for MemoryTelemetry {
    fn heartbeat(&self, op_id: &str, elapsed: Duration, note: Option<&str>) {
        self.records.lock().push(TelemetryRecord::Heartbeat {
            op_id: op_id.to_string(),
            elapsed,
            note: note.map(str::to_string),
        });
    }

    fn event(&self, op_id: &str, level: EventLevel, message: &str, data: Option<&Value>) {
        self.records.lock().push(TelemetryRecord::Event {
            op_id: op_id.to_string(),
            level,
            message: message.to_string(),
            data: data.cloned(),
        });
    }
}
