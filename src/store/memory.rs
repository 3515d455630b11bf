//! In-process reference backend.
//!
//! Backs the full [`Store`] contract with mutex-guarded maps: lists are
//! `VecDeque`s, hashes are nested maps, and pub/sub invokes subscriber
//! callbacks synchronously on publish. `eval` executes the mailbox claim
//! script under one lock, which is the same atomicity a scripting store
//! provides server-side.

use super::{NotificationCallback, SetMode, Store, StoreError, Subscription};
use crate::mailbox::CLAIM_SCRIPT;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

type Subscribers = HashMap<String, Vec<(u64, Arc<NotificationCallback>)>>;

#[derive(Default)]
pub struct MemoryStore {
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    hashes: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    subscribers: Arc<Mutex<Subscribers>>,
    next_token: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Atomic claim: pop the tail of the inbox and, when a value came off,
    /// record it in the pipeline hash under the supplied field.
    fn claim(&self, inbox: &str, pipeline: &str, field: &str) -> Option<Vec<u8>> {
        // Both locks held for the whole move, so no observer can see the
        // value in neither place.
        let mut lists = self.lists.lock().unwrap();
        let mut hashes = self.hashes.lock().unwrap();

        let claimed = lists.get_mut(inbox).and_then(|list| list.pop_back())?;
        hashes
            .entry(pipeline.to_string())
            .or_default()
            .insert(field.to_string(), claimed.clone());
        Some(claimed)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_push_tail(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap();
        lists.entry(key.to_string()).or_default().push_back(value);
        Ok(())
    }

    async fn list_push_head(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap();
        lists.entry(key.to_string()).or_default().push_front(value);
        Ok(())
    }

    async fn list_pop_tail(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut lists = self.lists.lock().unwrap();
        Ok(lists.get_mut(key).and_then(|list| list.pop_back()))
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let lists = self.lists.lock().unwrap();
        Ok(lists.get(key).map(|list| list.len()).unwrap_or(0))
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Vec<u8>,
        mode: SetMode,
    ) -> Result<bool, StoreError> {
        let mut hashes = self.hashes.lock().unwrap();
        let hash = hashes.entry(key.to_string()).or_default();
        match mode {
            SetMode::Overwrite => {
                hash.insert(field.to_string(), value);
                Ok(true)
            }
            SetMode::IfAbsent => {
                if hash.contains_key(field) {
                    Ok(false)
                } else {
                    hash.insert(field.to_string(), value);
                    Ok(true)
                }
            }
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let hashes = self.hashes.lock().unwrap();
        Ok(hashes.get(key).and_then(|hash| hash.get(field).cloned()))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut hashes = self.hashes.lock().unwrap();
        Ok(hashes
            .get_mut(key)
            .map(|hash| hash.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let hashes = self.hashes.lock().unwrap();
        Ok(hashes
            .get(key)
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[&str],
        args: &[&[u8]],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if script == CLAIM_SCRIPT {
            let &[inbox, pipeline] = keys else {
                return Err(StoreError::Backend(
                    "claim script takes exactly two keys".to_string(),
                ));
            };
            let &[field] = args else {
                return Err(StoreError::Backend(
                    "claim script takes exactly one argument".to_string(),
                ));
            };
            let field = String::from_utf8_lossy(field).to_string();
            Ok(self.claim(inbox, pipeline, &field))
        } else {
            Err(StoreError::UnsupportedScript)
        }
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), StoreError> {
        // Snapshot the callbacks first so a subscriber can unsubscribe from
        // inside its own callback without deadlocking.
        let callbacks: Vec<Arc<NotificationCallback>> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers
                .get(channel)
                .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default()
        };
        debug!(
            channel,
            subscriber_count = callbacks.len(),
            "publishing notification"
        );
        for callback in callbacks {
            callback(payload);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        callback: NotificationCallback,
    ) -> Result<Subscription, StoreError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers
                .entry(channel.to_string())
                .or_default()
                .push((token, Arc::new(callback)));
        }
        debug!(channel, token, "subscribed");

        let registry = Arc::clone(&self.subscribers);
        let channel = channel.to_string();
        Ok(Subscription::new(move || {
            let mut subscribers = registry.lock().unwrap();
            if let Some(subs) = subscribers.get_mut(&channel) {
                subs.retain(|(t, _)| *t != token);
                if subs.is_empty() {
                    subscribers.remove(&channel);
                }
            }
        }))
    }
}
