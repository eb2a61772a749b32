// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Queue for provider requests that cannot run immediately
//!
//! A single consumer task drains the queue one request at a time. Before each
//! dequeue the pending list is stably sorted so priority-tagged requests run
//! first while everything else keeps FIFO order. Each request waits until its
//! provider is admissible again, is counted against the quota, runs, and then
//! the consumer pauses for `drain_delay` before taking the next one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::quota::QuotaManager;
use super::types::{NormalizedResult, SearchError};

pub type QueuedOutcome = Result<Vec<NormalizedResult>, SearchError>;
pub type QueuedJob = Box<dyn FnOnce() -> BoxFuture<'static, QueuedOutcome> + Send>;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub capacity: usize,
    /// Pause after each completed request
    pub drain_delay: Duration,
    /// How long a request may wait for its provider's quota to free up
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: 64,
            drain_delay: Duration::from_millis(1000),
            max_wait: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A deferred provider call
pub struct QueuedRequest {
    provider_id: String,
    priority: bool,
    job: QueuedJob,
    respond_to: oneshot::Sender<QueuedOutcome>,
}

impl QueuedRequest {
    /// Wrap a job; the receiver resolves once the queue has run it
    pub fn new(
        provider_id: impl Into<String>,
        priority: bool,
        job: QueuedJob,
    ) -> (Self, oneshot::Receiver<QueuedOutcome>) {
        let (respond_to, rx) = oneshot::channel();
        (
            Self {
                provider_id: provider_id.into(),
                priority,
                job,
                respond_to,
            },
            rx,
        )
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn is_priority(&self) -> bool {
        self.priority
    }
}

pub struct RequestQueue {
    sender: mpsc::Sender<QueuedRequest>,
    depth: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl RequestQueue {
    /// Start the consumer task; must be called inside a tokio runtime
    pub fn spawn(quota: Arc<QuotaManager>, settings: QueueSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let depth = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(Self::run(receiver, quota, settings, depth.clone()));

        Self {
            sender,
            depth,
            worker,
        }
    }

    /// Enqueue a request; fails only when the queue is full or shut down
    pub fn add_to_queue(&self, request: QueuedRequest) -> Result<(), SearchError> {
        debug!(
            "Queueing request for {} (priority: {})",
            request.provider_id, request.priority
        );
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.sender.try_send(request).map_err(|e| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(r) => SearchError::QuotaExceeded {
                    provider: r.provider_id,
                },
                mpsc::error::TrySendError::Closed(_) => SearchError::QueueClosed,
            }
        })
    }

    /// Enqueue a job and wait for its outcome
    pub async fn submit(
        &self,
        provider_id: &str,
        priority: bool,
        job: QueuedJob,
    ) -> QueuedOutcome {
        let (request, rx) = QueuedRequest::new(provider_id, priority, job);
        self.add_to_queue(request)?;
        rx.await.map_err(|_| SearchError::QueueClosed)?
    }

    /// Requests waiting or running
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn run(
        mut receiver: mpsc::Receiver<QueuedRequest>,
        quota: Arc<QuotaManager>,
        settings: QueueSettings,
        depth: Arc<AtomicUsize>,
    ) {
        let mut pending: Vec<QueuedRequest> = Vec::new();

        loop {
            if pending.is_empty() {
                match receiver.recv().await {
                    Some(request) => pending.push(request),
                    None => break,
                }
            }
            while let Ok(request) = receiver.try_recv() {
                pending.push(request);
            }

            if pending.iter().any(|r| r.priority) {
                pending.sort_by_key(|r| !r.priority);
            }

            let request = pending.remove(0);
            Self::execute(request, &quota, &settings).await;
            depth.fetch_sub(1, Ordering::SeqCst);

            sleep(settings.drain_delay).await;
        }

        debug!("Request queue closed");
    }

    async fn execute(request: QueuedRequest, quota: &QuotaManager, settings: &QueueSettings) {
        let QueuedRequest {
            provider_id,
            job,
            respond_to,
            ..
        } = request;

        let deadline = Instant::now() + settings.max_wait;
        while !quota.try_acquire(&provider_id) {
            if Instant::now() >= deadline {
                warn!("Queued request for {} timed out waiting for quota", provider_id);
                let _ = respond_to.send(Err(SearchError::QuotaExceeded {
                    provider: provider_id,
                }));
                return;
            }
            sleep(settings.poll_interval).await;
        }

        // Run on its own task so a panicking job cannot take the consumer down
        let outcome = match tokio::spawn(job()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(SearchError::ApiError {
                status: 0,
                message: format!("queued request for {} aborted: {}", provider_id, e),
            }),
        };

        if let Err(ref e) = outcome {
            debug!("Queued request for {} failed: {}", provider_id, e);
        }

        // The caller may have stopped waiting
        let _ = respond_to.send(outcome);
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
