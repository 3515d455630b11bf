//! # Mailbox Protocol
//!
//! The durable intake/commit/ack layout every actor keeps under its key
//! prefix in the store:
//!
//! * `<id>:Mailbox:inbox`: list of waiting envelopes
//! * `<id>:Mailbox:pipeline`: hash of claimed, in-flight envelopes keyed by
//!   pipeline id
//! * `<id>:Mailbox:results`: hash of outputs keyed by correlation id
//! * `<id>:Mailbox:errors`: list of error envelopes
//! * `<id>:Mailbox:channel`: pub/sub topic for wakeup notifications
//!
//! The claim is the heart of the protocol: a single server-side script moves
//! one envelope from the inbox into the pipeline hash, so a worker crash can
//! never lose a message between the two. The envelope stays recoverable in
//! the pipeline until the commit deletes it.
//!
//! Queue convention: the claim pops from the tail. Normal-priority posts
//! push at the head (FIFO for normal traffic); high-priority posts push at
//! the tail so they are claimed first.

use crate::envelope::{Envelope, ErrorEnvelope, Priority};
use crate::errors::ActorError;
use crate::id::PipelineId;
use crate::store::{SetMode, Store};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Atomic claim executed server-side: pop the newest tail entry of the
/// inbox and record it in the pipeline hash under a fresh pipeline id.
pub const CLAIM_SCRIPT: &str = "local claimed = redis.call('RPOP', KEYS[1])
if claimed then redis.call('HSET', KEYS[2], ARGV[1], claimed) end
return claimed";

/// The store keys derived from an actor's identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxKeys {
    pub inbox: String,
    pub pipeline: String,
    pub results: String,
    pub errors: String,
    pub channel: String,
}

impl MailboxKeys {
    pub fn for_actor(id: &str) -> Self {
        let prefix = format!("{id}:Mailbox");
        Self {
            inbox: format!("{prefix}:inbox"),
            pipeline: format!("{prefix}:pipeline"),
            results: format!("{prefix}:results"),
            errors: format!("{prefix}:errors"),
            channel: format!("{prefix}:channel"),
        }
    }
}

/// One actor's view of its mailbox in the store.
///
/// Cheap to clone; every clone talks to the same keys through the shared
/// adapter. Holding a `Mailbox` does not imply owning the actor: fan-out
/// links keep posting through a clone after the child facade is gone.
#[derive(Clone)]
pub struct Mailbox {
    keys: MailboxKeys,
    store: Arc<dyn Store>,
}

impl Mailbox {
    pub fn new(actor_id: &str, store: Arc<dyn Store>) -> Self {
        Self {
            keys: MailboxKeys::for_actor(actor_id),
            store,
        }
    }

    pub fn keys(&self) -> &MailboxKeys {
        &self.keys
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Enqueue an already-serialized envelope and wake the dispatcher.
    pub async fn post_raw(&self, bytes: Vec<u8>, priority: Priority) -> Result<(), ActorError> {
        match priority {
            Priority::Normal => self.store.list_push_head(&self.keys.inbox, bytes).await?,
            Priority::High => self.store.list_push_tail(&self.keys.inbox, bytes).await?,
        }
        self.notify_message().await
    }

    /// Serialize and enqueue an envelope.
    pub async fn post<T: Serialize>(
        &self,
        envelope: &Envelope<T>,
        priority: Priority,
    ) -> Result<(), ActorError> {
        let bytes = serde_json::to_vec(envelope)?;
        self.post_raw(bytes, priority).await
    }

    /// Atomically move the next envelope from the inbox into the pipeline.
    /// Returns the fresh pipeline id and the raw envelope bytes, or `None`
    /// when the inbox is empty.
    pub async fn claim(&self) -> Result<Option<(PipelineId, Vec<u8>)>, ActorError> {
        let pipeline_id = PipelineId::generate();
        let claimed = self
            .store
            .eval(
                CLAIM_SCRIPT,
                &[&self.keys.inbox, &self.keys.pipeline],
                &[pipeline_id.as_str().as_bytes()],
            )
            .await?;
        match claimed {
            Some(bytes) => {
                debug!(pipeline_id = %pipeline_id, "claimed envelope");
                Ok(Some((pipeline_id, bytes)))
            }
            None => Ok(None),
        }
    }

    /// Record an envelope in the pipeline without going through the inbox.
    /// Used by the local request/reply bypass so a crash mid-execution still
    /// leaves the message recoverable.
    pub async fn record_in_pipeline(
        &self,
        pipeline_id: &PipelineId,
        bytes: Vec<u8>,
    ) -> Result<(), ActorError> {
        self.store
            .hash_set(
                &self.keys.pipeline,
                pipeline_id.as_str(),
                bytes,
                SetMode::Overwrite,
            )
            .await?;
        Ok(())
    }

    /// Delete a pipeline entry after its envelope has been fully handled.
    pub async fn commit(&self, pipeline_id: &PipelineId) -> Result<(), ActorError> {
        self.store
            .hash_delete(&self.keys.pipeline, pipeline_id.as_str())
            .await?;
        debug!(pipeline_id = %pipeline_id, "committed pipeline entry");
        Ok(())
    }

    /// Everything currently in the pipeline hash. Entries found here on
    /// start are leftovers of a crashed worker and are re-executed.
    pub async fn pending(&self) -> Result<Vec<(PipelineId, Vec<u8>)>, ActorError> {
        let entries = self.store.hash_entries(&self.keys.pipeline).await?;
        Ok(entries
            .into_iter()
            .map(|(field, bytes)| (PipelineId::from(field), bytes))
            .collect())
    }

    /// Write the output for a correlation id and wake any result waiters.
    /// The write overwrites, so a reused correlation id sees the latest
    /// result.
    pub async fn write_result(
        &self,
        correlation_id: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ActorError> {
        self.store
            .hash_set(&self.keys.results, correlation_id, bytes, SetMode::Overwrite)
            .await?;
        self.store
            .publish(&self.keys.channel, correlation_id.as_bytes())
            .await?;
        Ok(())
    }

    /// Read the result for a correlation id, optionally consuming it.
    pub async fn read_result(
        &self,
        correlation_id: &str,
        consume: bool,
    ) -> Result<Option<Vec<u8>>, ActorError> {
        let result = self
            .store
            .hash_get(&self.keys.results, correlation_id)
            .await?;
        if result.is_some() && consume {
            self.store
                .hash_delete(&self.keys.results, correlation_id)
                .await?;
        }
        Ok(result)
    }

    /// Append an error envelope to the errors list.
    pub async fn record_error(&self, envelope: &ErrorEnvelope) -> Result<(), ActorError> {
        let bytes = serde_json::to_vec(envelope)?;
        self.store.list_push_tail(&self.keys.errors, bytes).await?;
        Ok(())
    }

    /// Number of envelopes waiting in the inbox.
    pub async fn queue_len(&self) -> Result<usize, ActorError> {
        Ok(self.store.list_len(&self.keys.inbox).await?)
    }

    /// Publish the "mailbox may be non-empty" hint.
    pub async fn notify_message(&self) -> Result<(), ActorError> {
        self.store.publish(&self.keys.channel, &[]).await?;
        Ok(())
    }
}
