//! # Store Adapter
//!
//! The seam between the actor runtime and the shared key-value store. All
//! I/O the runtime performs goes through the [`Store`] trait: list push/pop,
//! hash operations, atomic server-side scripts, and pub/sub. The adapter is
//! shared as `Arc<dyn Store>` across every actor in the process and must be
//! safe under concurrent use.
//!
//! Transport framing, connection pooling, and the serialization of values
//! are the backend's business; the runtime only ever sees opaque byte
//! strings.

use async_trait::async_trait;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// Errors surfaced by store backends
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("script not supported by this backend")]
    UnsupportedScript,

    #[error("store operation failed: {0}")]
    Backend(String),
}

/// Overwrite policy for [`Store::hash_set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace any existing value at the field
    Overwrite,
    /// Only write when the field is absent
    IfAbsent,
}

/// Callback invoked with the raw payload of each published message
pub type NotificationCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// RAII guard for an active subscription. Dropping it detaches the callback;
/// no notifications are delivered afterwards.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

/// Abstract interface over the key-value + pub/sub store backing every
/// mailbox.
///
/// Implementations must make `eval` atomic with respect to every other
/// operation on the same keys; the claim protocol depends on it.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Append a value at the tail of a list
    async fn list_push_tail(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Prepend a value at the head of a list
    async fn list_push_head(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove and return the value at the tail of a list
    async fn list_pop_tail(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Number of values in a list
    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Write a hash field, honoring the overwrite policy. Returns whether
    /// the write happened.
    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Vec<u8>,
        mode: SetMode,
    ) -> Result<bool, StoreError>;

    /// Read a hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete a hash field. Returns whether the field existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    /// All fields and values of a hash
    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Execute a script atomically on the store
    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[&[u8]],
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Publish a payload to every subscriber of a channel
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError>;

    /// Attach a callback to a channel. The callback runs for every publish
    /// until the returned [`Subscription`] is dropped.
    async fn subscribe(
        &self,
        channel: &str,
        callback: NotificationCallback,
    ) -> Result<Subscription, StoreError>;
}
