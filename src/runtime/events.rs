//! Run lifecycle events.
//!
//! Terminal events are where the owning service hangs webhooks and
//! progress reporting; the engine only emits.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events emitted while a run executes.
#[derive(Clone, Debug, Serialize)]
pub enum RunEvent {
    NodeStarted {
        run_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        run_id: String,
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        run_id: String,
        node_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        run_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    RunCancelled {
        run_id: String,
        timestamp: DateTime<Utc>,
    },
}

/// Sender wrapper with an atomic active flag so emission is cheaply
/// skipped when nobody is listening.
#[derive(Clone)]
pub struct EventEmitter {
    tx: Option<mpsc::Sender<RunEvent>>,
    active: Arc<AtomicBool>,
}

impl EventEmitter {
    /// Emitter bound to a live channel.
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        EventEmitter {
            tx: Some(tx),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Emitter that drops everything.
    pub fn disabled() -> Self {
        EventEmitter {
            tx: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a channel plus its emitter.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub async fn emit(&self, event: RunEvent) {
        if !self.is_active() {
            return;
        }
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                // Receiver dropped; stop trying.
                self.active.store(false, Ordering::Relaxed);
            }
        }
    }
}
