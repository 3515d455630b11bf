//! # Wakeup Bus
//!
//! Two local edge-triggered signals per actor, fed from a single pub/sub
//! subscription on the mailbox channel: `message-arrived` (empty payload)
//! and `result-arrived` (any non-empty payload). The signals are hints, not
//! delivery: every waiter re-reads the store after waking.
//!
//! Each signal is a `watch` counter. Waiters snapshot the counter with
//! [`WakeupWaiter::arm`] before re-checking the store and then wait for a
//! change, so a raise that lands between the check and the wait still wakes
//! them.

use crate::envelope::Notification;
use crate::store::{Store, StoreError, Subscription};
use std::sync::Arc;
use tokio::sync::watch;

/// One edge-triggered signal. Raising it wakes every armed waiter.
pub struct WakeupSignal {
    tx: watch::Sender<u64>,
}

impl WakeupSignal {
    fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(0u64);
        Arc::new(Self { tx })
    }

    pub fn raise(&self) {
        self.tx.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// A waiter on one signal. Keeps its signal alive so a pending wait only
/// ever resolves on a genuine raise.
pub struct WakeupWaiter {
    _signal: Arc<WakeupSignal>,
    rx: watch::Receiver<u64>,
}

impl WakeupWaiter {
    fn new(signal: Arc<WakeupSignal>) -> Self {
        let rx = signal.tx.subscribe();
        Self { _signal: signal, rx }
    }

    /// Snapshot the signal. Every raise after this point, including ones
    /// that land before [`wait`](Self::wait) is called, wakes the next wait.
    pub fn arm(&mut self) {
        let _ = self.rx.borrow_and_update();
    }

    /// Wait for a raise since the last arm.
    pub async fn wait(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// The per-actor pair of signals plus the store subscription feeding them.
/// Dropping the bus detaches the subscription; nothing is raised afterwards.
pub struct WakeupBus {
    message_arrived: Arc<WakeupSignal>,
    result_arrived: Arc<WakeupSignal>,
    _subscription: Subscription,
}

impl WakeupBus {
    /// Subscribe to the actor's channel and demultiplex notifications into
    /// the two signals.
    pub async fn attach(store: &Arc<dyn Store>, channel: &str) -> Result<Self, StoreError> {
        let message_arrived = WakeupSignal::new();
        let result_arrived = WakeupSignal::new();

        let message_signal = Arc::clone(&message_arrived);
        let result_signal = Arc::clone(&result_arrived);
        let subscription = store
            .subscribe(
                channel,
                Box::new(move |payload| match Notification::decode(payload) {
                    Notification::MessageArrived => message_signal.raise(),
                    Notification::ResultArrived => result_signal.raise(),
                }),
            )
            .await?;

        Ok(Self {
            message_arrived,
            result_arrived,
            _subscription: subscription,
        })
    }

    pub fn message_waiter(&self) -> WakeupWaiter {
        WakeupWaiter::new(Arc::clone(&self.message_arrived))
    }

    pub fn result_waiter(&self) -> WakeupWaiter {
        WakeupWaiter::new(Arc::clone(&self.result_arrived))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raise_between_arm_and_wait_is_not_lost() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let bus = WakeupBus::attach(&store, "test:channel").await.unwrap();

        let mut waiter = bus.message_waiter();
        waiter.arm();
        store.publish("test:channel", &[]).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter.wait())
            .await
            .expect("raise before wait should still wake the waiter");
    }

    #[tokio::test]
    async fn test_payload_demultiplexing() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let bus = WakeupBus::attach(&store, "test:channel").await.unwrap();

        let mut message_waiter = bus.message_waiter();
        let mut result_waiter = bus.result_waiter();
        message_waiter.arm();
        result_waiter.arm();

        store.publish("test:channel", b"abc123").await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), result_waiter.wait())
            .await
            .expect("non-empty payload should raise result-arrived");
        let woke = tokio::time::timeout(Duration::from_millis(50), message_waiter.wait()).await;
        assert!(woke.is_err(), "non-empty payload must not raise message-arrived");
    }

    #[tokio::test]
    async fn test_dropping_bus_detaches_subscription() {
        let store: Arc<dyn Store> = MemoryStore::new();
        let bus = WakeupBus::attach(&store, "test:channel").await.unwrap();
        let mut waiter = bus.message_waiter();
        waiter.arm();
        drop(bus);

        store.publish("test:channel", &[]).await.unwrap();
        let woke = tokio::time::timeout(Duration::from_millis(50), waiter.wait()).await;
        assert!(woke.is_err(), "detached subscription must not raise signals");
    }
}
