//! Host scheduler: feeds store events into the work queue and runs workers
//! that invoke the reconciler.

use std::sync::Arc;

use cumulus_engine::{Event, ObjectKey, Reconcile, SchedulingInstruction};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::WorkQueue;
use crate::rate::ItemBackoff;

pub struct Controller {
    reconciler: Arc<dyn Reconcile>,
    queue: Arc<WorkQueue<ObjectKey>>,
    workers: usize,
}

impl Controller {
    pub fn new(reconciler: Arc<dyn Reconcile>, workers: usize) -> Self {
        Self::with_backoff(reconciler, workers, ItemBackoff::quick())
    }

    /// Controller whose immediate requeues use `backoff`.
    pub fn with_backoff(
        reconciler: Arc<dyn Reconcile>,
        workers: usize,
        backoff: ItemBackoff<ObjectKey>,
    ) -> Self {
        Self {
            reconciler,
            queue: Arc::new(WorkQueue::new(backoff)),
            workers: workers.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Run until `cancel` fires.
    ///
    /// `initial` keys are queued first, so objects that existed before the
    /// event subscription are reconciled too.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<Event>,
        initial: Vec<ObjectKey>,
        cancel: CancellationToken,
    ) {
        info!(
            workflow = self.reconciler.name(),
            workers = self.workers,
            initial = initial.len(),
            "Starting controller"
        );
        for key in initial {
            self.queue.add(key);
        }

        let mut tasks = JoinSet::new();
        for id in 0..self.workers {
            tasks.spawn(worker(
                id,
                Arc::clone(&self.reconciler),
                Arc::clone(&self.queue),
                cancel.clone(),
            ));
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(Event::Deleted(key)) => {
                        debug!(%key, "Object deleted");
                        self.queue.forget(&key);
                    }
                    Ok(event) => {
                        debug!(key = %event.key(), event = event.event_type(), "Event received");
                        self.queue.add(event.key().clone());
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Event stream lagged, resynchronizing");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Event stream closed");
                        break;
                    }
                },
            }
        }

        self.queue.shut_down();
        while tasks.join_next().await.is_some() {}
        info!(workflow = self.reconciler.name(), "Controller stopped");
    }

    /// Queue every known key. Recovers from missed events.
    async fn resync(&self) {
        match self.reconciler.list_keys().await {
            Ok(keys) => {
                info!(
                    workflow = self.reconciler.name(),
                    keys = keys.len(),
                    "Queueing all objects"
                );
                for key in keys {
                    self.queue.add(key);
                }
            }
            Err(e) => error!(workflow = self.reconciler.name(), error = %e, "Failed to list objects"),
        }
    }
}

async fn worker(
    id: usize,
    reconciler: Arc<dyn Reconcile>,
    queue: Arc<WorkQueue<ObjectKey>>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "Worker started");
    while let Some(key) = queue.get().await {
        let instruction = reconciler.invoke(cancel.child_token(), &key).await;
        match instruction {
            SchedulingInstruction::None => queue.forget(&key),
            SchedulingInstruction::Now => queue.add_rate_limited(key.clone()),
            SchedulingInstruction::After(delay) => {
                queue.forget(&key);
                queue.add_after(key.clone(), delay);
            }
        }
        queue.done(&key);
    }
    debug!(worker = id, "Worker stopped");
}
