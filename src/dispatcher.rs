//! # Dispatcher
//!
//! One long-running task per running actor. The loop acquires a permit from
//! the process-wide semaphore, claims the next envelope atomically, and
//! spawns the computation as its own task so further claims can proceed in
//! parallel up to the semaphore bound. The permit travels into the spawned
//! task and is released when the computation finishes, so the semaphore is a
//! real bound on in-flight work.
//!
//! Computation failures never reach the loop: they become error envelopes
//! routed to the errors list and the bound error-handler actor. A store
//! failure terminates the loop; calling `start` again recovers, re-executing
//! whatever the pipeline hash still holds.

use crate::envelope::{Envelope, ErrorEnvelope, Priority};
use crate::errors::ActorError;
use crate::id::PipelineId;
use crate::mailbox::Mailbox;
use crate::shutdown::ShutdownReceiver;
use crate::wakeup::WakeupWaiter;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A user-supplied computation turning an input message into an output
/// message. Failures are reported as `anyhow::Error` and become error
/// envelopes.
pub type Computation<I, O> =
    Arc<dyn Fn(I) -> BoxFuture<'static, anyhow::Result<O>> + Send + Sync>;

/// Wrap a plain async function or closure as a [`Computation`].
pub fn computation<I, O, F, Fut>(f: F) -> Computation<I, O>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    Arc::new(move |input| f(input).boxed())
}

/// Child links: identity of the child mapped to a handle on its mailbox.
/// The parent never owns a child's lifecycle.
pub(crate) type ChildLinks = Arc<RwLock<HashMap<String, Mailbox>>>;

/// The bound error handler, if any: its identity plus a mailbox handle
pub(crate) type ErrorHandlerSlot = Arc<RwLock<Option<(String, Mailbox)>>>;

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "computation panicked".to_string()
    }
}

/// Shared execution context for one actor: the computation plus the
/// commit/fan-out/error dataflow. Used by the dispatcher's spawned tasks and
/// by the local request/reply bypass.
pub(crate) struct Worker<I, O> {
    pub actor_id: String,
    pub mailbox: Mailbox,
    pub computation: Computation<I, O>,
    pub children: ChildLinks,
    pub error_handler: ErrorHandlerSlot,
}

impl<I, O> Worker<I, O>
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
    O: Serialize + Send + Sync + 'static,
{
    /// Run the computation, capturing panics as ordinary failures.
    async fn run_computation(&self, input: I) -> Result<O, String> {
        let fut = (self.computation)(input);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(panic_message(panic)),
        }
    }

    /// Post the output to every linked child as a fresh fire-and-forget
    /// envelope. A failing child post is logged and the remaining children
    /// still receive theirs.
    async fn fan_out(&self, output: &O) {
        let children = self.children.read().await;
        if children.is_empty() {
            return;
        }
        let bytes = match serde_json::to_vec(&Envelope::fire_and_forget(output)) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(actor = %self.actor_id, "failed to encode fan-out envelope: {}", e);
                return;
            }
        };
        for (child_id, child_mailbox) in children.iter() {
            debug!(actor = %self.actor_id, child = %child_id, "fanning out result");
            if let Err(e) = child_mailbox.post_raw(bytes.clone(), Priority::Normal).await {
                error!(
                    actor = %self.actor_id,
                    child = %child_id,
                    "failed to fan out to child: {}", e
                );
            }
        }
    }

    /// Append the failure to the errors list and post it to the bound
    /// error-handler actor.
    async fn record_failure(&self, payload: serde_json::Value, error_text: &str) {
        warn!(actor = %self.actor_id, "computation failed: {}", error_text);
        let envelope = ErrorEnvelope::new(&self.actor_id, payload, error_text);
        if let Err(e) = self.mailbox.record_error(&envelope).await {
            error!(actor = %self.actor_id, "failed to record error envelope: {}", e);
        }

        let handler = self.error_handler.read().await;
        if let Some((handler_id, handler_mailbox)) = handler.as_ref() {
            let posted = match serde_json::to_vec(&Envelope::fire_and_forget(&envelope)) {
                Ok(bytes) => handler_mailbox.post_raw(bytes, Priority::Normal).await,
                Err(e) => Err(ActorError::Serialization(e)),
            };
            if let Err(e) = posted {
                error!(
                    actor = %self.actor_id,
                    handler = %handler_id,
                    "failed to post error envelope to handler: {}", e
                );
            }
        }
    }

    /// The original input as JSON, recovered from the stored envelope bytes
    /// for the error path.
    fn raw_payload(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice::<Envelope<serde_json::Value>>(bytes)
            .map(|env| env.payload)
            .unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            })
    }

    /// Handle one claimed envelope end to end: compute, fan out, delete the
    /// pipeline entry, publish the result for correlated requests. On
    /// failure the error is recorded and the pipeline entry is still
    /// deleted, so a deterministically failing message is not retried
    /// forever.
    pub async fn execute(&self, pipeline_id: PipelineId, bytes: Vec<u8>) {
        let envelope: Envelope<I> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.record_failure(
                    Self::raw_payload(&bytes),
                    &format!("undecodable envelope: {e}"),
                )
                .await;
                if let Err(e) = self.mailbox.commit(&pipeline_id).await {
                    error!(actor = %self.actor_id, "failed to drop poison entry: {}", e);
                }
                return;
            }
        };

        let correlation_id = envelope.correlation_id.clone();
        match self.run_computation(envelope.payload).await {
            Ok(output) => {
                self.fan_out(&output).await;
                if let Err(e) = self.mailbox.commit(&pipeline_id).await {
                    error!(actor = %self.actor_id, "commit failed: {}", e);
                    return;
                }
                if !correlation_id.is_empty() {
                    let written = match serde_json::to_vec(&output) {
                        Ok(bytes) => self.mailbox.write_result(&correlation_id, bytes).await,
                        Err(e) => Err(ActorError::Serialization(e)),
                    };
                    if let Err(e) = written {
                        error!(actor = %self.actor_id, "failed to publish result: {}", e);
                    }
                }
            }
            Err(error_text) => {
                self.record_failure(Self::raw_payload(&bytes), &error_text).await;
                if let Err(e) = self.mailbox.commit(&pipeline_id).await {
                    error!(actor = %self.actor_id, "commit after failure failed: {}", e);
                }
            }
        }
    }

    /// The local request/reply bypass: record the envelope in the pipeline
    /// for crash recovery, run the computation on the caller's task, fan
    /// out, and return the output directly. No trip through the inbox, no
    /// write to the results hash.
    pub async fn execute_local(&self, input: I) -> Result<O, ActorError> {
        let envelope = Envelope::fire_and_forget(input);
        let bytes = serde_json::to_vec(&envelope)?;
        let pipeline_id = PipelineId::generate();
        self.mailbox.record_in_pipeline(&pipeline_id, bytes.clone()).await?;

        match self.run_computation(envelope.payload).await {
            Ok(output) => {
                self.fan_out(&output).await;
                self.mailbox.commit(&pipeline_id).await?;
                Ok(output)
            }
            Err(error_text) => {
                self.record_failure(Self::raw_payload(&bytes), &error_text).await;
                self.mailbox.commit(&pipeline_id).await?;
                Err(ActorError::Computation(error_text))
            }
        }
    }
}

/// The per-actor claim loop
pub(crate) struct Dispatcher<I, O> {
    worker: Arc<Worker<I, O>>,
    semaphore: Arc<Semaphore>,
    shutdown: ShutdownReceiver,
    wakeup: WakeupWaiter,
}

impl<I, O> Dispatcher<I, O>
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
    O: Serialize + Send + Sync + 'static,
{
    pub fn new(
        worker: Arc<Worker<I, O>>,
        semaphore: Arc<Semaphore>,
        shutdown: ShutdownReceiver,
        wakeup: WakeupWaiter,
    ) -> Self {
        Self {
            worker,
            semaphore,
            shutdown,
            wakeup,
        }
    }

    /// Acquire one permit, racing the shutdown signal. `None` means the
    /// actor is stopping.
    async fn next_permit(&mut self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            _ = self.shutdown.wait_for_shutdown() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        }
    }

    /// Re-execute whatever a previous worker left in the pipeline hash.
    async fn recover(&mut self, tasks: &mut JoinSet<()>) -> Result<(), ActorError> {
        let pending = self.worker.mailbox.pending().await?;
        if pending.is_empty() {
            return Ok(());
        }
        info!(
            actor = %self.worker.actor_id,
            count = pending.len(),
            "re-executing leftover pipeline entries"
        );
        for (pipeline_id, bytes) in pending {
            let Some(permit) = self.next_permit().await else {
                return Ok(());
            };
            let worker = Arc::clone(&self.worker);
            tasks.spawn(async move {
                worker.execute(pipeline_id, bytes).await;
                drop(permit);
            });
        }
        Ok(())
    }

    async fn claim_loop(&mut self, tasks: &mut JoinSet<()>) -> Result<(), ActorError> {
        loop {
            // Reap finished executions so the set does not grow unbounded
            while tasks.try_join_next().is_some() {}

            let Some(permit) = self.next_permit().await else {
                return Ok(());
            };

            let (pipeline_id, bytes) = loop {
                self.wakeup.arm();
                match self.worker.mailbox.claim().await? {
                    Some(claimed) => break claimed,
                    None => {
                        tokio::select! {
                            _ = self.shutdown.wait_for_shutdown() => return Ok(()),
                            _ = self.wakeup.wait() => {}
                        }
                    }
                }
            };

            let worker = Arc::clone(&self.worker);
            tasks.spawn(async move {
                worker.execute(pipeline_id, bytes).await;
                drop(permit);
            });
        }
    }

    /// Run until shutdown or a store failure, then let in-flight
    /// computations finish and commit.
    pub async fn run(mut self) {
        info!(actor = %self.worker.actor_id, "dispatcher starting");
        let mut tasks: JoinSet<()> = JoinSet::new();

        let result = match self.recover(&mut tasks).await {
            Ok(()) => self.claim_loop(&mut tasks).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(
                actor = %self.worker.actor_id,
                "dispatcher terminating on store failure: {}", e
            );
        }

        // In-flight computations are not cancelled; they run to completion
        // and commit, draining the pipeline naturally.
        while tasks.join_next().await.is_some() {}
        info!(actor = %self.worker.actor_id, "dispatcher stopped");
    }
}
