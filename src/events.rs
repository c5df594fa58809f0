//! Structured diagnostic events for a sync run.
//!
//! Warning-level conditions (duplicate identities, title fallbacks, dropped
//! fetch failures, filtered invalid documents) are emitted on a channel the
//! caller subscribes to instead of being logged ad hoc. Events never change
//! control flow and are never fatal. Human and JSON sinks write to
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Mutex;

/// A single warning-level event observed during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Two source paths collapsed to the same identity; the first wins.
    DuplicateIdentity {
        identity: String,
        kept_path: String,
        dropped_path: String,
    },
    /// A document body had no level-1 heading; title fell back to identity.
    TitleFallback { identity: String },
    /// A content fetch failed; the document appears in no change category.
    FetchFailed { identity: String, error: String },
    /// A document failed the validation gate and was filtered out.
    InvalidDocument { identity: String, reason: String },
}

/// Receives diagnostic events. Implementations must not block the pipeline.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SyncEvent);
}

/// Human-friendly warnings on stderr: `warn: duplicate identity "aml" ...`.
pub struct StderrSink;

impl EventSink for StderrSink {
    fn emit(&self, event: SyncEvent) {
        let line = match &event {
            SyncEvent::DuplicateIdentity {
                identity,
                kept_path,
                dropped_path,
            } => format!(
                "warn: duplicate identity \"{}\" (kept {}, dropped {})\n",
                identity, kept_path, dropped_path
            ),
            SyncEvent::TitleFallback { identity } => {
                format!("warn: no heading in \"{}\", title falls back to identity\n", identity)
            }
            SyncEvent::FetchFailed { identity, error } => {
                format!("warn: fetch failed for \"{}\": {}\n", identity, error)
            }
            SyncEvent::InvalidDocument { identity, reason } => {
                format!("warn: skipping invalid document \"{}\": {}\n", identity, reason)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }
}

/// Machine-readable events: one JSON object per line on stderr.
pub struct JsonSink;

impl EventSink for JsonSink {
    fn emit(&self, event: SyncEvent) {
        let obj = match &event {
            SyncEvent::DuplicateIdentity {
                identity,
                kept_path,
                dropped_path,
            } => serde_json::json!({
                "event": "duplicate_identity",
                "identity": identity,
                "kept_path": kept_path,
                "dropped_path": dropped_path,
            }),
            SyncEvent::TitleFallback { identity } => serde_json::json!({
                "event": "title_fallback",
                "identity": identity,
            }),
            SyncEvent::FetchFailed { identity, error } => serde_json::json!({
                "event": "fetch_failed",
                "identity": identity,
                "error": error,
            }),
            SyncEvent::InvalidDocument { identity, reason } => serde_json::json!({
                "event": "invalid_document",
                "identity": identity,
                "reason": reason,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op sink when diagnostics are disabled.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SyncEvent) {}
}

/// Buffers events in memory so callers (and tests) can inspect them.
#[derive(Default)]
pub struct BufferSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything emitted so far.
    pub fn take(&self) -> Vec<SyncEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventSink for BufferSink {
    fn emit(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Diagnostics mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventMode {
    Off,
    Human,
    Json,
}

impl EventMode {
    /// Default: human warnings when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            EventMode::Human
        } else {
            EventMode::Off
        }
    }

    /// Build a sink for this mode. Caller passes it through the pipeline.
    pub fn sink(&self) -> Box<dyn EventSink> {
        match self {
            EventMode::Off => Box::new(NullSink),
            EventMode::Human => Box::new(StderrSink),
            EventMode::Json => Box::new(JsonSink),
        }
    }
}
