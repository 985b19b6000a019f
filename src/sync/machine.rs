//! Debounced background sync of one document.
//!
//! Every edit is written to the local cache before [`SyncHandle::mutate`]
//! returns. A background task pushes the latest edit once no new edit has
//! arrived for the debounce window, keeping at most one push in flight.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::cache::LocalCache;
use super::envelope::Envelope;
use super::loader::write_cache;
use super::remote::{RemoteStore, Resource};

/// Sync progress of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// The server has the latest edit
    Clean,
    /// Edits the server has not accepted yet
    Dirty,
    /// A push is in flight; `dirty` is set when an edit arrived meanwhile
    Syncing { dirty: bool },
}

impl SyncState {
    pub fn on_mutation(self) -> Self {
        match self {
            SyncState::Clean | SyncState::Dirty => SyncState::Dirty,
            SyncState::Syncing { .. } => SyncState::Syncing { dirty: true },
        }
    }

    /// Only a dirty document starts a push
    pub fn on_push_started(self) -> Self {
        match self {
            SyncState::Dirty => SyncState::Syncing { dirty: false },
            other => other,
        }
    }

    pub fn on_push_settled(self, success: bool) -> Self {
        match self {
            SyncState::Syncing { dirty: false } if success => SyncState::Clean,
            SyncState::Syncing { .. } => SyncState::Dirty,
            other => other,
        }
    }
}

/// Handle to a document's sync task
pub struct SyncHandle {
    resource: Resource,
    schema_version: u32,
    cache: Arc<dyn LocalCache>,
    tx: mpsc::Sender<Envelope>,
    state: Arc<watch::Sender<SyncState>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn spawn(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        resource: Resource,
        schema_version: u32,
        debounce: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(100);
        let state = Arc::new(watch::Sender::new(SyncState::Clean));

        let worker = SyncWorker {
            remote,
            resource: resource.clone(),
            debounce,
            state: state.clone(),
        };
        let task = tokio::spawn(worker.run(rx));

        Self {
            resource,
            schema_version,
            cache,
            tx,
            state,
            task,
        }
    }

    /// Record an edit: cache it now, push it after the debounce window.
    ///
    /// The state turns dirty once the sync task takes the edit, so it
    /// always moves together with the task's pending edit.
    pub async fn mutate(&self, payload: Value) -> Result<()> {
        let envelope = Envelope::new(self.schema_version, payload);
        write_cache(self.cache.as_ref(), &self.resource, &envelope);
        self.tx
            .send(envelope)
            .await
            .map_err(|_| anyhow::anyhow!("Sync task for {} has stopped", self.resource))
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Stop accepting edits, push anything still pending and wait for the
    /// task to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            debug!(error = %e, "Sync task ended abnormally");
        }
    }
}

struct SyncWorker {
    remote: Arc<dyn RemoteStore>,
    resource: Resource,
    debounce: Duration,
    state: Arc<watch::Sender<SyncState>>,
}

impl SyncWorker {
    fn transition(&self, next: impl FnOnce(SyncState) -> SyncState) {
        self.state.send_modify(|state| *state = next(*state));
    }

    fn start_push(&self, envelope: Envelope, done: mpsc::Sender<bool>) {
        self.transition(SyncState::on_push_started);
        let remote = self.remote.clone();
        let resource = self.resource.clone();
        tokio::spawn(async move {
            let success = match remote.push(&resource, &envelope).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(resource = %resource, error = %e, "Sync push failed");
                    false
                }
            };
            let _ = done.send(success).await;
        });
    }

    async fn run(self, mut rx: mpsc::Receiver<Envelope>) {
        let (done_tx, mut done_rx) = mpsc::channel::<bool>(1);
        let mut pending: Option<Envelope> = None;
        let mut deadline: Option<Instant> = None;
        let mut in_flight = false;
        let mut open = true;

        loop {
            if !open && !in_flight {
                // Flush whatever is left, then stop
                if let Some(envelope) = pending.take() {
                    self.start_push(envelope, done_tx.clone());
                    in_flight = true;
                    deadline = None;
                } else {
                    break;
                }
            }

            tokio::select! {
                message = rx.recv(), if open => match message {
                    Some(envelope) => {
                        self.transition(SyncState::on_mutation);
                        pending = Some(envelope);
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => open = false,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() && !in_flight =>
                {
                    deadline = None;
                    if let Some(envelope) = pending.take() {
                        self.start_push(envelope, done_tx.clone());
                        in_flight = true;
                    }
                }
                Some(success) = done_rx.recv(), if in_flight => {
                    in_flight = false;
                    self.transition(|state| state.on_push_settled(success));
                    if !success && pending.is_none() {
                        // Not retried until the next edit
                        deadline = None;
                    }
                }
            }
        }

        debug!(resource = %self.resource, "Sync task stopped");
    }
}
