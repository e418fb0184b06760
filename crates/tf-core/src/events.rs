//! Batch event stream.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Publishing never
//! blocks, which keeps progress callbacks cheap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::ids::{BatchId, EventId};
use crate::media::{MediaKind, ProbeResult, ProgressEvent};

// ---------------------------------------------------------------------------
// Payload building blocks
// ---------------------------------------------------------------------------

/// Which batch operation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    Scan,
    WriteTags,
    RemoveTags,
    SaveInPlace,
    Export,
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scan => "scan",
            Self::WriteTags => "write tags",
            Self::RemoveTags => "remove tags",
            Self::SaveInPlace => "save",
            Self::Export => "export",
        };
        f.write_str(s)
    }
}

/// Severity of a [`EventPayload::LogLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Final state of one file in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded { message: String },
    Failed { stage: String, message: String },
    Skipped { reason: String },
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded { .. } => self.succeeded += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    pub fn done(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    BatchStarted {
        batch_id: BatchId,
        operation: BatchOperation,
        total: usize,
    },
    ItemScanned {
        path: PathBuf,
        kind: Option<MediaKind>,
        size_bytes: Option<u64>,
        probe: ProbeResult,
    },
    LogLine {
        level: LogLevel,
        message: String,
    },
    FileProgress {
        path: PathBuf,
        progress: ProgressEvent,
    },
    ItemFinished {
        path: PathBuf,
        outcome: ItemOutcome,
    },
    Progress {
        done: usize,
        total: usize,
    },
    BatchDone {
        batch_id: BatchId,
        summary: BatchSummary,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh ID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel for batch events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus. `capacity` is the broadcast buffer size; a
    /// subscriber that falls further behind sees `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers.
    pub fn publish(&self, payload: EventPayload) {
        // No subscribers is fine.
        let _ = self.tx.send(Event::new(payload));
    }

    /// Publish a [`EventPayload::LogLine`].
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.publish(EventPayload::LogLine {
            level,
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
