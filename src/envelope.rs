use crate::id::CorrelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a post lands in the inbox.
///
/// Normal posts queue FIFO; high-priority posts jump the queue and are
/// claimed before anything already waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Normal,
    High,
}

/// A message carried through an actor's mailbox.
///
/// The correlation id is empty exactly when the producer does not await a
/// reply; `post_and_reply` fills it with a fresh [`CorrelationId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub payload: T,
    #[serde(default)]
    pub correlation_id: String,
}

impl<T> Envelope<T> {
    pub fn fire_and_forget(payload: T) -> Self {
        Self {
            payload,
            correlation_id: String::new(),
        }
    }

    pub fn with_correlation(payload: T, correlation_id: &CorrelationId) -> Self {
        Self {
            payload,
            correlation_id: correlation_id.as_str().to_string(),
        }
    }

    pub fn expects_reply(&self) -> bool {
        !self.correlation_id.is_empty()
    }
}

/// What a failed computation leaves behind: the input that triggered it,
/// the error text, and where it happened. Appended to the actor's errors
/// list and posted to the bound error-handler actor, which consumes these
/// envelopes as its own input type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub actor_id: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEnvelope {
    pub fn new(actor_id: &str, payload: serde_json::Value, error: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            payload,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The two signal kinds one channel subscription demultiplexes.
///
/// On the wire an empty payload means "mailbox may be non-empty" and any
/// non-empty payload means "a result may have arrived". Waiters re-read the
/// store after every wake; the payload contents beyond emptiness are hints
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    MessageArrived,
    ResultArrived,
}

impl Notification {
    pub fn decode(payload: &[u8]) -> Self {
        if payload.is_empty() {
            Notification::MessageArrived
        } else {
            Notification::ResultArrived
        }
    }
}
