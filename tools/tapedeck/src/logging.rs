use crate::errors::TapedeckError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), TapedeckError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TapedeckError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| TapedeckError::Serialization(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TapedeckError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| TapedeckError::Io(e.to_string()))
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes.saturating_sub(3);
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(format!("{}...", &rendered[..end]))
}

// ── Process-wide event log ────────────────────────────────────────────────────

struct EventLog {
    logger: JsonlLogger,
    write_lock: Mutex<()>,
}

static EVENT_LOG: OnceLock<Mutex<Option<Arc<EventLog>>>> = OnceLock::new();

fn event_log_slot() -> &'static Mutex<Option<Arc<EventLog>>> {
    EVENT_LOG.get_or_init(|| Mutex::new(None))
}

/// Route session events to `logger` until [`clear_event_log`] is called.
pub fn init_event_log(logger: JsonlLogger) {
    let state = Arc::new(EventLog {
        logger,
        write_lock: Mutex::new(()),
    });
    *event_log_slot().lock().expect("event log init lock") = Some(state);
}

pub fn clear_event_log() {
    *event_log_slot().lock().expect("event log clear lock") = None;
}

/// Append an event if an event log is configured. Failures are swallowed so
/// logging never changes the outcome of a session.
pub fn log_event(level: &str, event_type: &str, payload: Value) {
    let state = {
        let guard = event_log_slot().lock().expect("event log emit lock");
        match guard.as_ref() {
            Some(state) => Arc::clone(state),
            None => return,
        }
    };
    let _write = state.write_lock.lock().expect("event log write lock");
    let _ = state.logger.append(&LogEvent {
        level,
        event_type,
        payload,
    });
}
