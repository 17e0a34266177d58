//! User-facing success/failure notifications.
//!
//! Every store mutator reports its outcome exactly once through a
//! [`Notifier`]. Notifications are emitted on **stderr** so stdout stays
//! parseable for scripts, either as human-readable lines
//! ([`StderrNotifier`]) or as one JSON object per line ([`JsonNotifier`]).
//! [`MemoryNotifier`] records them for tests and embedding applications.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

/// One notification: outcome, entity kind it concerns, message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub kind: String,
    pub message: String,
}

impl Notification {
    pub fn success(kind: EntityKind, message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            kind: kind.as_str().to_string(),
            message: message.into(),
        }
    }

    pub fn error(kind: EntityKind, message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            kind: kind.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// Sink for notifications. Implementations must not block for long; they
/// are called inline from store operations.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Human-friendly lines on stderr: `✓ Customer created successfully`.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        let mark = match notification.level {
            Level::Success => "✓",
            Level::Error => "✗",
        };
        let line = format!("{} {}\n", mark, notification.message);
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable notifications: one JSON object per line on stderr.
pub struct JsonNotifier;

impl Notifier for JsonNotifier {
    fn notify(&self, notification: Notification) {
        let obj = serde_json::json!({
            "event": "notification",
            "level": notification.level,
            "kind": notification.kind,
            "message": notification.message,
        });
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", obj);
        let _ = err.flush();
    }
}

/// Discards everything.
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _notification: Notification) {}
}

/// Records notifications in memory, in emission order.
#[derive(Default)]
pub struct MemoryNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}

/// Output mode for notifications.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyMode {
    Human,
    Json,
    Silent,
}

impl NotifyMode {
    /// Human output on an interactive terminal, JSON otherwise, unless
    /// JSON is forced.
    pub fn detect(force_json: bool) -> Self {
        if force_json || !atty::is(atty::Stream::Stderr) {
            NotifyMode::Json
        } else {
            NotifyMode::Human
        }
    }

    pub fn notifier(self) -> Box<dyn Notifier> {
        match self {
            NotifyMode::Human => Box::new(StderrNotifier),
            NotifyMode::Json => Box::new(JsonNotifier),
            NotifyMode::Silent => Box::new(SilentNotifier),
        }
    }
}
