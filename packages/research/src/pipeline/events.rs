//! Append-only progress log for a research run.
//!
//! Every notable step of a run (model turns, tool calls, guard hits,
//! finalize or fallback) is appended with a strictly increasing index.
//! Callers read a snapshot after the run or subscribe for live progress.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StepStarted {
        step: usize,
    },
    AssistantText {
        text: String,
    },
    ToolCalled {
        tool: String,
        arguments: String,
    },
    ToolRejected {
        tool: String,
        message: String,
    },
    GuardTriggered {
        message: String,
    },
    SearchCompleted {
        query: String,
        hits: usize,
        error: Option<String>,
    },
    ExtractStarted {
        url: String,
    },
    ExtractCompleted {
        url: String,
        broken: bool,
        irrelevant: bool,
        selections: usize,
        cached: bool,
    },
    Finalized {
        results: usize,
    },
    FallbackUsed {
        recovered: usize,
    },
}

/// One entry of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchEvent {
    pub index: u64,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

/// Append-only event log with monotonic indices.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ResearchEvent>>,
    subscriber: Option<UnboundedSender<ResearchEvent>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log that also forwards every event to `subscriber`.
    pub fn with_subscriber(subscriber: UnboundedSender<ResearchEvent>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            subscriber: Some(subscriber),
        }
    }

    /// Append an event and return its index.
    pub fn push(&self, kind: EventKind) -> u64 {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let event = ResearchEvent {
            index: events.len() as u64,
            at: Utc::now(),
            kind,
        };
        let index = event.index;
        if let Some(subscriber) = &self.subscriber {
            // A dropped receiver only stops live progress.
            let _ = subscriber.send(event.clone());
        }
        events.push(event);
        index
    }

    /// Copy of every event so far, in index order.
    pub fn snapshot(&self) -> Vec<ResearchEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events so far.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
