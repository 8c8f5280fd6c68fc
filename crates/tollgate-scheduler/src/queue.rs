//! Bounded event queue and worker pool.
//!
//! Inbound events are buffered in a fixed-capacity channel drained by a
//! fixed number of workers. A full queue either rejects (`try_submit`) or
//! makes the producer wait (`submit`).

use crate::shutdown::wait_for_shutdown;
use async_channel::{Receiver, Sender, TrySendError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tollgate_core::events::EventEnvelope;
use tollgate_core::ids::EventId;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("event queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("event queue is closed")]
    Closed,
}

/// Processes one dequeued event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: EventEnvelope);
}

/// Producer side of the event queue.
#[derive(Clone)]
pub struct EventQueue {
    tx: Sender<EventEnvelope>,
    capacity: usize,
}

impl EventQueue {
    /// Create a queue and the receiver its workers drain.
    pub fn bounded(capacity: usize) -> (Self, Receiver<EventEnvelope>) {
        let capacity = capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);
        (Self { tx, capacity }, rx)
    }

    /// Enqueue without waiting; fails when the queue is at capacity.
    pub fn try_submit(&self, envelope: EventEnvelope) -> Result<EventId, QueueError> {
        let id = envelope.id;
        match self.tx.try_send(envelope) {
            Ok(()) => {
                debug!(event_id = %id, queued = self.tx.len(), "Event queued");
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                warn!(event_id = %id, capacity = self.capacity, "Event queue full, rejecting event");
                Err(QueueError::Full {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Enqueue, waiting for space.
    pub async fn submit(&self, envelope: EventEnvelope) -> Result<EventId, QueueError> {
        let id = envelope.id;
        self.tx.send(envelope).await.map_err(|_| QueueError::Closed)?;
        debug!(event_id = %id, queued = self.tx.len(), "Event queued");
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting events. Workers drain what is already queued.
    pub fn close(&self) {
        self.tx.close();
    }
}

/// Fixed-size pool of workers draining an [`EventQueue`].
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn spawn(
        size: usize,
        rx: Receiver<EventEnvelope>,
        handler: Arc<dyn EventHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut workers = JoinSet::new();
        for worker in 0..size.max(1) {
            let rx = rx.clone();
            let handler = handler.clone();
            let shutdown = shutdown.clone();
            workers.spawn(run_worker(worker, rx, handler, shutdown));
        }
        info!(workers = workers.len(), "Started event workers");
        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to stop.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Event worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    rx: Receiver<EventEnvelope>,
    handler: Arc<dyn EventHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => {
                debug!(worker, "Event worker shutting down");
                break;
            }
            envelope = rx.recv() => match envelope {
                Ok(envelope) => {
                    debug!(worker, event_id = %envelope.id, "Handling event");
                    handler.handle(envelope).await;
                }
                Err(_) => {
                    debug!(worker, "Event queue closed, worker exiting");
                    break;
                }
            }
        }
    }
}
