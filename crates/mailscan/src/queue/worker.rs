use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, Notify};
use tracing::{debug, info_span, warn, Instrument as _};

use crate::error::{MailscanError, ProcessingError, QueueError};
use crate::model::AsyncProcessingState;
use crate::processing::MailProcessor;

use super::status::{PackageStatus, StatusEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct QueueState {
    queue: VecDeque<String>,
    statuses: HashMap<String, PackageStatus>,
    /// Id currently being analyzed, if any.
    in_flight: Option<String>,
    /// Guard ensuring a single active drain task. Strictly serial
    /// processing is a policy choice: classification is rate-sensitive and
    /// package order does not matter for correctness.
    is_processing: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    events: broadcast::Sender<StatusEvent>,
    idle: Notify,
    processor: Arc<MailProcessor>,
}

impl QueueInner {
    fn publish(&self, package_id: &str, status: PackageStatus) {
        // No receivers is fine; the channel is purely observational.
        let _ = self.events.send(StatusEvent {
            package_id: package_id.to_string(),
            status,
            timestamp: self.processor.now(),
        });
    }
}

/// FIFO queue draining one package at a time through the orchestrator's
/// analysis step. Failure isolates at package granularity: one bad package
/// transitions to `Failed` and the drain moves on.
///
/// Queue membership and statuses live in memory; only the OCR bridge records
/// are durable. After a restart, `recover_pending` rebuilds the queue from
/// stored package state.
#[derive(Clone)]
pub struct BackgroundQueue {
    inner: Arc<QueueInner>,
}

impl BackgroundQueue {
    pub fn new(processor: Arc<MailProcessor>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    statuses: HashMap::new(),
                    in_flight: None,
                    is_processing: false,
                }),
                events,
                idle: Notify::new(),
                processor,
            }),
        }
    }

    /// Appends the id to the tail and starts the drain if idle. Idempotent:
    /// an id already queued or currently in flight is left alone.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, package_id: &str) {
        let start_drain = {
            let mut state = self.inner.state.lock().unwrap();
            if state.queue.iter().any(|id| id == package_id)
                || state.in_flight.as_deref() == Some(package_id)
            {
                debug!(%package_id, "already enqueued, ignoring");
                return;
            }
            state.queue.push_back(package_id.to_string());
            state
                .statuses
                .insert(package_id.to_string(), PackageStatus::Queued);
            let start = !state.is_processing;
            if start {
                state.is_processing = true;
            }
            start
        };

        self.inner.publish(package_id, PackageStatus::Queued);

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(drain(inner));
        }
    }

    /// Removes the id from the queue and clears its status. Explicit
    /// cancellation; an analysis already in flight is not interrupted.
    pub fn dequeue(&self, package_id: &str) {
        let mut state = self.inner.state.lock().unwrap();
        state.queue.retain(|id| id != package_id);
        state.statuses.remove(package_id);
    }

    /// Re-enqueues a failed package. The queue applies no retry policy of
    /// its own; when and whether to call this is the integrator's decision.
    pub fn requeue(&self, package_id: &str) -> Result<(), QueueError> {
        // Check and re-add under one lock so a concurrent requeue for the
        // same id cannot clobber the fresh Queued status.
        let start_drain = {
            let mut state = self.inner.state.lock().unwrap();
            if state.statuses.get(package_id) != Some(&PackageStatus::Failed) {
                return Err(QueueError::NotFailed(package_id.to_string()));
            }
            // Failed ids are never in the queue or in flight, so this re-adds.
            state.queue.push_back(package_id.to_string());
            state
                .statuses
                .insert(package_id.to_string(), PackageStatus::Queued);
            let start = !state.is_processing;
            if start {
                state.is_processing = true;
            }
            start
        };

        self.inner.publish(package_id, PackageStatus::Queued);

        if start_drain {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(drain(inner));
        }
        Ok(())
    }

    /// Rebuilds queue membership after a restart: every stored package still
    /// in the scanning phase that has a durable OCR bridge record is
    /// re-enqueued. Returns the recovered ids in stored order.
    pub fn recover_pending(&self) -> Result<Vec<String>, MailscanError> {
        let store = self.inner.processor.store();
        let mut recovered = Vec::new();

        for package in store.list_packages()? {
            if package.async_processing_state != AsyncProcessingState::Scanning {
                continue;
            }
            if store.load_ocr_bridge(&package.id)?.is_none() {
                continue;
            }
            self.enqueue(&package.id);
            recovered.push(package.id);
        }

        if !recovered.is_empty() {
            debug!(count = recovered.len(), "recovered pending packages");
        }
        Ok(recovered)
    }

    pub fn status(&self, package_id: &str) -> PackageStatus {
        self.inner
            .state
            .lock()
            .unwrap()
            .statuses
            .get(package_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().unwrap().is_processing
    }

    /// Subscribes to the ordered status-change log.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the queue is empty and no drain is active.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            {
                let state = self.inner.state.lock().unwrap();
                if !state.is_processing && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

/// Single-worker drain loop: each package fully reaches a terminal status
/// before the next one starts.
async fn drain(inner: Arc<QueueInner>) {
    loop {
        let next = {
            let mut state = inner.state.lock().unwrap();
            match state.queue.pop_front() {
                Some(id) => {
                    state.in_flight = Some(id.clone());
                    state.statuses.insert(id.clone(), PackageStatus::Processing);
                    Some(id)
                }
                None => {
                    state.is_processing = false;
                    state.in_flight = None;
                    None
                }
            }
        };

        let Some(package_id) = next else {
            inner.idle.notify_waiters();
            return;
        };

        inner.publish(&package_id, PackageStatus::Processing);

        let span = info_span!("background_analysis", package_id = %package_id);
        let status = match process_one(&inner, &package_id).instrument(span).await {
            Ok(()) => PackageStatus::ReadyForSurvey,
            Err(e) => {
                warn!(%package_id, error = %e, "background analysis failed");
                PackageStatus::Failed
            }
        };

        {
            let mut state = inner.state.lock().unwrap();
            state.statuses.insert(package_id.clone(), status);
            state.in_flight = None;
        }
        inner.publish(&package_id, status);
    }
}

/// One package's background step: load the OCR bridge, classify, merge the
/// result into the stored record, delete the bridge.
async fn process_one(inner: &QueueInner, package_id: &str) -> Result<(), MailscanError> {
    let store = inner.processor.store();

    // Enqueue without a prior bridge write is a precondition violation and
    // a hard failure, never retried.
    let bridge = store.load_ocr_bridge(package_id)?.ok_or_else(|| {
        ProcessingError::ProcessingFailed(format!("no OCR data for package '{}'", package_id))
    })?;

    let now = inner.processor.now();
    let result = inner
        .processor
        .complete_analysis(package_id, &bridge.ocr_texts, now)
        .await?;

    let mut package = store.load_package(package_id)?.ok_or_else(|| {
        ProcessingError::ProcessingFailed(format!("package '{}' not found locally", package_id))
    })?;
    package.apply_analysis(&result, inner.processor.now());
    store.save_package(&package)?;

    store.delete_ocr_bridge(package_id)?;
    debug!(%package_id, "package ready for survey");
    Ok(())
}
