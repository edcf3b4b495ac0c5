//! Streaming projection processor with periodic checkpointing.

use std::sync::Arc;

use event_store::{EventStore, GlobalSequence};
use futures_util::StreamExt;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

use crate::Result;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::ProjectionError;
use crate::projection::Projection;

/// Lifecycle of a [`ProjectionProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    /// Not consuming. Initial state, and the state after a graceful stop.
    Stopped,

    /// Loading the checkpoint and restoring state.
    Recovering,

    /// Consuming the global event order.
    Streaming,

    /// A handler rejected an event; consumption halted without
    /// advancing the checkpoint past it.
    Faulted,
}

struct Shared<S> {
    state: RwLock<S>,
    last_processed: RwLock<GlobalSequence>,
    status: RwLock<ProcessorStatus>,
}

/// A single-consumer streaming subscriber over the event log's global
/// order.
///
/// Folds events into the projection's state strictly sequentially:
/// event *n* is fully applied before event *n+1* is requested, so the
/// state is always a consistent fold prefix of the log. Every
/// `checkpoint_interval` processed events the state is persisted
/// together with the position as a [`Checkpoint`]; a crash between
/// checkpoints re-delivers the tail on restart, which handlers must
/// tolerate.
pub struct ProjectionProcessor<P, ES, CS>
where
    P: Projection,
    ES: EventStore + 'static,
    CS: CheckpointStore + 'static,
{
    projection: Arc<P>,
    events: Arc<ES>,
    checkpoints: Arc<CS>,
    checkpoint_interval: u64,
    shared: Arc<Shared<P::State>>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl<P, ES, CS> ProjectionProcessor<P, ES, CS>
where
    P: Projection,
    ES: EventStore + 'static,
    CS: CheckpointStore + 'static,
{
    /// Default number of processed events between checkpoints.
    pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

    /// Creates a stopped processor with the default checkpoint interval.
    pub fn new(projection: P, events: Arc<ES>, checkpoints: Arc<CS>) -> Self {
        Self::with_checkpoint_interval(
            projection,
            events,
            checkpoints,
            Self::DEFAULT_CHECKPOINT_INTERVAL,
        )
    }

    /// Creates a stopped processor checkpointing every `interval`
    /// processed events.
    pub fn with_checkpoint_interval(
        projection: P,
        events: Arc<ES>,
        checkpoints: Arc<CS>,
        interval: u64,
    ) -> Self {
        Self {
            projection: Arc::new(projection),
            events,
            checkpoints,
            checkpoint_interval: interval.max(1),
            shared: Arc::new(Shared {
                state: RwLock::new(P::State::default()),
                last_processed: RwLock::new(GlobalSequence::unassigned()),
                status: RwLock::new(ProcessorStatus::Stopped),
            }),
            shutdown: None,
            handle: None,
        }
    }

    /// Recovers from the last checkpoint and starts streaming.
    #[tracing::instrument(skip(self), fields(projection_id = self.projection.projection_id()))]
    pub async fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(ProjectionError::AlreadyRunning);
        }

        *self.shared.status.write().await = ProcessorStatus::Recovering;

        let projection_id = self.projection.projection_id();
        let checkpoint = self.checkpoints.load(projection_id).await?;
        let resume_from = match checkpoint {
            Some(checkpoint) => {
                let position = checkpoint.last_processed;
                *self.shared.state.write().await = checkpoint.into_state()?;
                *self.shared.last_processed.write().await = position;
                tracing::info!(%position, "resuming projection from checkpoint");
                position
            }
            None => {
                *self.shared.state.write().await = P::State::default();
                *self.shared.last_processed.write().await = GlobalSequence::unassigned();
                GlobalSequence::unassigned()
            }
        };

        let stream = self.events.subscribe_all(resume_from.next()).await?;

        let (tx, rx) = watch::channel(false);
        self.shutdown = Some(tx);
        self.handle = Some(tokio::spawn(run_loop::<P, CS>(
            Arc::clone(&self.projection),
            Arc::clone(&self.checkpoints),
            Arc::clone(&self.shared),
            stream,
            rx,
            self.checkpoint_interval,
        )));

        Ok(())
    }

    /// Stops pulling new events, finishes the in-flight handler call,
    /// persists a final checkpoint, and releases the subscription.
    ///
    /// Returns the task's terminal result: a handler failure that
    /// faulted the processor surfaces here.
    #[tracing::instrument(skip(self), fields(projection_id = self.projection.projection_id()))]
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|err| ProjectionError::Task(err.to_string()))?,
            None => Ok(()),
        }
    }

    /// Aborts the consuming task immediately, without draining or a
    /// final checkpoint. Unlike [`stop`](Self::stop), progress since
    /// the last periodic checkpoint is lost and will be re-delivered on
    /// the next start.
    pub async fn abort(&mut self) {
        self.shutdown = None;
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        *self.shared.status.write().await = ProcessorStatus::Stopped;
    }

    /// Returns a clone of the current projection state.
    pub async fn state(&self) -> P::State {
        self.shared.state.read().await.clone()
    }

    /// The last global sequence whose effect is in the state.
    pub async fn last_processed(&self) -> GlobalSequence {
        *self.shared.last_processed.read().await
    }

    /// The processor's lifecycle state.
    pub async fn status(&self) -> ProcessorStatus {
        *self.shared.status.read().await
    }
}

async fn run_loop<P, CS>(
    projection: Arc<P>,
    checkpoints: Arc<CS>,
    shared: Arc<Shared<P::State>>,
    mut stream: event_store::EventStream,
    mut shutdown: watch::Receiver<bool>,
    checkpoint_interval: u64,
) -> Result<()>
where
    P: Projection,
    CS: CheckpointStore + 'static,
{
    let projection_id = projection.projection_id();
    *shared.status.write().await = ProcessorStatus::Streaming;
    let mut processed: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = stream.next() => {
                let envelope = match next {
                    Some(Ok(envelope)) => envelope,
                    Some(Err(err)) => {
                        *shared.status.write().await = ProcessorStatus::Faulted;
                        return Err(err.into());
                    }
                    None => break,
                };

                let current = shared.state.read().await.clone();
                let next_state = match projection.apply(current, &envelope) {
                    Ok(state) => state,
                    Err(err) => {
                        tracing::error!(
                            projection_id,
                            global_sequence = %envelope.global_sequence,
                            error = %err,
                            "projection handler failed, halting"
                        );
                        *shared.status.write().await = ProcessorStatus::Faulted;
                        return Err(err);
                    }
                };

                *shared.state.write().await = next_state;
                *shared.last_processed.write().await = envelope.global_sequence;
                processed += 1;
                metrics::counter!("projection_events_processed").increment(1);

                if processed % checkpoint_interval == 0 {
                    persist_checkpoint(&*checkpoints, projection_id, &shared).await;
                }
            }
        }
    }

    // Final checkpoint on graceful shutdown.
    persist_checkpoint(&*checkpoints, projection_id, &shared).await;
    *shared.status.write().await = ProcessorStatus::Stopped;
    tracing::info!(projection_id, processed, "projection processor stopped");
    Ok(())
}

/// Best-effort periodic checkpoint: a failure only widens the
/// re-delivery window, so it is logged and processing continues.
async fn persist_checkpoint<S, CS>(checkpoints: &CS, projection_id: &str, shared: &Shared<S>)
where
    S: serde::Serialize,
    CS: CheckpointStore,
{
    let position = *shared.last_processed.read().await;
    let checkpoint = {
        let state = shared.state.read().await;
        Checkpoint::from_state(projection_id, position, &*state)
    };

    match checkpoint {
        Ok(checkpoint) => {
            if let Err(err) = checkpoints.save(checkpoint).await {
                tracing::warn!(projection_id, %position, error = %err, "checkpoint save failed");
            }
        }
        Err(err) => {
            tracing::warn!(projection_id, error = %err, "checkpoint serialization failed");
        }
    }
}
