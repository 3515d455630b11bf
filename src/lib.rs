//! # Troupe
//!
//! Troupe is a runtime for actors whose mailboxes live in a shared
//! key-value store with pub/sub. Each actor has a stable identity, a
//! durable mailbox under its own key prefix, and an optional computation
//! from input messages to output messages. Any process holding the identity
//! and store credentials can post; any process given the computation can
//! execute.
//!
//! ## Core Features
//!
//! * **Durable intake**: messages move from the inbox to an in-flight
//!   pipeline hash in one atomic store-side step, so a worker crash never
//!   loses a claimed message
//! * **Request/reply**: `post_and_reply` correlates a caller with its
//!   result through the store, with a local bypass when the actor runs in
//!   the calling process
//! * **Pipelines**: linked child actors receive every output as a fresh
//!   post, forming processing chains
//! * **Errors as messages**: computation failures become error envelopes,
//!   recorded durably and routed to an error-handler actor
//! * **Bounded concurrency**: one process-wide semaphore caps in-flight
//!   computations across all actors
//!
//! ## Architecture
//!
//! * [`Troupe`]: process-wide context owning the shared store handle and
//!   the semaphore; constructs actors
//! * [`Actor`]: the facade: lifecycle, posting, request/reply, links
//! * [`Mailbox`]: the per-actor key layout and intake/commit/ack protocol
//! * [`Store`]: the adapter trait every backend implements; the in-process
//!   [`MemoryStore`] backs tests and single-process deployments

pub mod actor;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod id;
pub mod logging;
pub mod mailbox;
pub(crate) mod shutdown;
pub mod store;
pub mod troupe;
pub(crate) mod wakeup;

pub use actor::Actor;
pub use config::TroupeConfig;
pub use dispatcher::{computation, Computation};
pub use envelope::{Envelope, ErrorEnvelope, Notification, Priority};
pub use errors::ActorError;
pub use id::{CorrelationId, PipelineId};
pub use mailbox::{Mailbox, MailboxKeys, CLAIM_SCRIPT};
pub use store::{MemoryStore, SetMode, Store, StoreError, Subscription};
pub use troupe::Troupe;
