use crate::store::StoreError;
use thiserror::Error;
use tokio::time::Duration;

/// # ActorError
///
/// Represents errors surfaced by the actor facade and its dispatcher.
///
/// Computation failures are deliberately absent from the dispatcher's own
/// control flow: they are recorded as error envelopes and routed to the
/// error-handler actor. The `Computation` variant only reaches callers of
/// the local `post_and_reply` bypass, where the failure belongs to the
/// caller's own request.
#[derive(Error, Debug)]
pub enum ActorError {
    /// `start` was called on an actor constructed without a computation
    #[error("actor '{0}' has no computation to run")]
    NoComputation(String),

    /// The actor was disposed and can no longer touch the store
    #[error("actor '{0}' is disposed")]
    Disposed(String),

    /// `start` was called while the dispatcher is already running
    #[error("actor '{0}' is already running")]
    AlreadyRunning(String),

    /// `post_and_reply` gave up waiting for a correlated result
    #[error("timed out after {0:?} waiting for a reply")]
    ReplyTimeout(Duration),

    /// The computation failed while executing on the caller's task
    #[error("computation failed: {0}")]
    Computation(String),

    /// A store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An envelope or result could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected runtime condition
    #[error("internal error: {0}")]
    Internal(String),
}
