//! # Actor Facade
//!
//! The public handle for one actor: lifecycle (`start`/`stop`/`dispose`),
//! posting, request/reply, child links, and the error-handler binding.
//!
//! The store is the source of truth for message state. Everything the facade
//! holds in memory: the children map, the error-handler slot, the running
//! flag: is ephemeral and rebuilt by whoever constructs the actor next.

use crate::config::TroupeConfig;
use crate::dispatcher::{ChildLinks, Computation, Dispatcher, ErrorHandlerSlot, Worker};
use crate::envelope::{Envelope, ErrorEnvelope, Priority};
use crate::errors::ActorError;
use crate::id::CorrelationId;
use crate::mailbox::Mailbox;
use crate::shutdown::{ShutdownController, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::store::Store;
use crate::wakeup::{WakeupBus, WakeupWaiter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Duration, Instant};
use tracing::{info, warn};

enum Lifecycle {
    Created,
    Running {
        shutdown: ShutdownController,
        dispatcher: JoinHandle<()>,
    },
    Stopped,
    Disposed,
}

/// An actor: a stable identity, a durable mailbox in the store, and an
/// optional computation from `I` to `O`.
///
/// Any process holding the identity and a store handle can post to the
/// mailbox; only a process that was given the computation can `start` the
/// actor and execute it.
pub struct Actor<I, O> {
    id: String,
    mailbox: Mailbox,
    semaphore: Arc<Semaphore>,
    config: TroupeConfig,
    worker: Option<Arc<Worker<I, O>>>,
    children: ChildLinks,
    error_handler: ErrorHandlerSlot,
    wakeup: Mutex<Option<WakeupBus>>,
    lifecycle: Mutex<Lifecycle>,
}

impl<I, O> Actor<I, O>
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
    O: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) async fn new(
        id: String,
        store: Arc<dyn Store>,
        semaphore: Arc<Semaphore>,
        config: TroupeConfig,
        computation: Option<Computation<I, O>>,
    ) -> Result<Self, ActorError> {
        let mailbox = Mailbox::new(&id, Arc::clone(&store));
        let wakeup = WakeupBus::attach(&store, &mailbox.keys().channel).await?;

        let children: ChildLinks = Arc::new(RwLock::new(HashMap::new()));
        let error_handler: ErrorHandlerSlot = Arc::new(RwLock::new(None));
        let worker = computation.map(|computation| {
            Arc::new(Worker {
                actor_id: id.clone(),
                mailbox: mailbox.clone(),
                computation,
                children: Arc::clone(&children),
                error_handler: Arc::clone(&error_handler),
            })
        });

        Ok(Self {
            id,
            mailbox,
            semaphore,
            config,
            worker,
            children,
            error_handler,
            wakeup: Mutex::new(Some(wakeup)),
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of envelopes waiting in the inbox
    pub async fn queue_len(&self) -> Result<usize, ActorError> {
        self.ensure_not_disposed().await?;
        self.mailbox.queue_len().await
    }

    /// Identities of the linked children
    pub async fn children(&self) -> Vec<String> {
        self.children.read().await.keys().cloned().collect()
    }

    /// Link a child: from now on every output this actor produces is posted
    /// to the child's mailbox as a fresh fire-and-forget message. At most
    /// one link per child identity; re-linking replaces it. Returns the
    /// parent so links can be chained.
    pub async fn link<CO>(&self, child: &Actor<O, CO>) -> &Self {
        self.children
            .write()
            .await
            .insert(child.id.clone(), child.mailbox.clone());
        self
    }

    /// Remove the link to a child by identity
    pub async fn unlink(&self, child_id: &str) -> &Self {
        self.children.write().await.remove(child_id);
        self
    }

    /// Bind the actor that receives this actor's error envelopes as input
    pub async fn set_error_handler<EO>(&self, handler: &Actor<ErrorEnvelope, EO>) {
        *self.error_handler.write().await = Some((handler.id.clone(), handler.mailbox.clone()));
    }

    /// Identity of the bound error handler, if any
    pub async fn error_handler(&self) -> Option<String> {
        self.error_handler
            .read()
            .await
            .as_ref()
            .map(|(id, _)| id.clone())
    }

    /// Whether the dispatcher is running in this process
    pub async fn is_running(&self) -> bool {
        matches!(&*self.lifecycle.lock().await, Lifecycle::Running { .. })
    }

    /// Start the dispatcher. Requires a computation; valid from the created
    /// and stopped states. Leftover pipeline entries from a crashed worker
    /// are re-executed before new claims.
    pub async fn start(&self) -> Result<(), ActorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Disposed => return Err(ActorError::Disposed(self.id.clone())),
            Lifecycle::Running { .. } => return Err(ActorError::AlreadyRunning(self.id.clone())),
            Lifecycle::Created | Lifecycle::Stopped => {}
        }
        let worker = self
            .worker
            .clone()
            .ok_or_else(|| ActorError::NoComputation(self.id.clone()))?;

        let message_waiter = {
            let wakeup = self.wakeup.lock().await;
            let bus = wakeup
                .as_ref()
                .ok_or_else(|| ActorError::Disposed(self.id.clone()))?;
            bus.message_waiter()
        };

        let (controller, receiver) = ShutdownController::new();
        let dispatcher = Dispatcher::new(
            worker,
            Arc::clone(&self.semaphore),
            receiver,
            message_waiter,
        );
        let handle = tokio::spawn(dispatcher.run());
        *lifecycle = Lifecycle::Running {
            shutdown: controller,
            dispatcher: handle,
        };
        info!(actor = %self.id, "actor started");
        Ok(())
    }

    /// Cancel the dispatcher. The inbox is not drained; in-flight
    /// computations run to completion and commit before this returns
    /// (bounded by the shutdown timeout).
    pub async fn stop(&self) -> Result<(), ActorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(&*lifecycle, Lifecycle::Disposed) {
            return Err(ActorError::Disposed(self.id.clone()));
        }
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        drop(lifecycle);

        if let Lifecycle::Running {
            shutdown,
            dispatcher,
        } = previous
        {
            shutdown.signal_shutdown();
            if timeout(DEFAULT_SHUTDOWN_TIMEOUT, dispatcher).await.is_err() {
                warn!(actor = %self.id, "dispatcher did not stop in time, detaching");
            }
            info!(actor = %self.id, "actor stopped");
        }
        Ok(())
    }

    /// Stop the dispatcher, release the wakeup signals and the channel
    /// subscription, and refuse all further operations. The shared
    /// semaphore is untouched; it belongs to the process, not the actor.
    pub async fn dispose(&self) -> Result<(), ActorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(&*lifecycle, Lifecycle::Disposed) {
            return Ok(());
        }
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Disposed);
        drop(lifecycle);

        if let Lifecycle::Running {
            shutdown,
            dispatcher,
        } = previous
        {
            shutdown.signal_shutdown();
            if timeout(DEFAULT_SHUTDOWN_TIMEOUT, dispatcher).await.is_err() {
                warn!(actor = %self.id, "dispatcher did not stop in time, detaching");
            }
        }
        self.wakeup.lock().await.take();
        info!(actor = %self.id, "actor disposed");
        Ok(())
    }

    /// Fire-and-forget post at normal priority
    pub async fn post(&self, msg: I) -> Result<(), ActorError> {
        self.post_with_priority(msg, Priority::Normal).await
    }

    /// Fire-and-forget post at the given priority. Valid whether or not the
    /// actor is running anywhere.
    pub async fn post_with_priority(&self, msg: I, priority: Priority) -> Result<(), ActorError> {
        self.ensure_not_disposed().await?;
        self.mailbox
            .post(&Envelope::fire_and_forget(msg), priority)
            .await
    }

    /// Post and await the correlated result, with the configured default
    /// timeout
    pub async fn post_and_reply(&self, msg: I) -> Result<O, ActorError> {
        self.post_and_reply_with(msg, Priority::Normal, Some(self.config.reply_timeout))
            .await
    }

    /// Post and await the correlated result.
    ///
    /// When the actor is running in this process the computation executes
    /// directly on the caller's task after the envelope is recorded in the
    /// pipeline, skipping the inbox and the results hash. Otherwise the
    /// envelope is queued with a fresh correlation id and the caller waits
    /// for the result to appear in the store, woken by the result-arrived
    /// signal. `reply_timeout` bounds the total wait; `None` waits forever.
    pub async fn post_and_reply_with(
        &self,
        msg: I,
        priority: Priority,
        reply_timeout: Option<Duration>,
    ) -> Result<O, ActorError> {
        self.ensure_not_disposed().await?;

        if let Some(worker) = self.running_worker().await {
            let bypass = worker.execute_local(msg);
            return match reply_timeout {
                Some(t) => timeout(t, bypass)
                    .await
                    .map_err(|_| ActorError::ReplyTimeout(t))?,
                None => bypass.await,
            };
        }

        let correlation_id = CorrelationId::generate();
        let envelope = Envelope::with_correlation(msg, &correlation_id);
        self.mailbox.post(&envelope, priority).await?;

        let mut waiter = self.result_waiter().await?;
        let consume = self.config.delete_result_on_read;
        let deadline = reply_timeout.map(|t| (t, Instant::now() + t));
        loop {
            waiter.arm();
            if let Some(bytes) = self
                .mailbox
                .read_result(correlation_id.as_str(), consume)
                .await?
            {
                return Ok(serde_json::from_slice(&bytes)?);
            }
            match deadline {
                None => waiter.wait().await,
                Some((t, at)) => {
                    if timeout_at(at, waiter.wait()).await.is_err() {
                        // Deadline passed; the result may have landed while
                        // we were arming, so look once more before failing.
                        if let Some(bytes) = self
                            .mailbox
                            .read_result(correlation_id.as_str(), consume)
                            .await?
                        {
                            return Ok(serde_json::from_slice(&bytes)?);
                        }
                        return Err(ActorError::ReplyTimeout(t));
                    }
                }
            }
        }
    }

    async fn ensure_not_disposed(&self) -> Result<(), ActorError> {
        if matches!(&*self.lifecycle.lock().await, Lifecycle::Disposed) {
            return Err(ActorError::Disposed(self.id.clone()));
        }
        Ok(())
    }

    async fn running_worker(&self) -> Option<Arc<Worker<I, O>>> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Running { .. } => self.worker.clone(),
            _ => None,
        }
    }

    async fn result_waiter(&self) -> Result<WakeupWaiter, ActorError> {
        let wakeup = self.wakeup.lock().await;
        let bus = wakeup
            .as_ref()
            .ok_or_else(|| ActorError::Disposed(self.id.clone()))?;
        Ok(bus.result_waiter())
    }
}
