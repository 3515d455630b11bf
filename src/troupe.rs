use crate::actor::Actor;
use crate::config::TroupeConfig;
use crate::dispatcher::Computation;
use crate::errors::ActorError;
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Process-wide context shared by every actor: the store adapter, the
/// semaphore bounding concurrently executing computations, and the config.
///
/// The semaphore belongs here, not to any actor: disposing an actor never
/// touches it, so the remaining actors keep their bound.
pub struct Troupe {
    store: Arc<dyn Store>,
    semaphore: Arc<Semaphore>,
    config: TroupeConfig,
}

impl Troupe {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, TroupeConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: TroupeConfig) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
        }
    }

    /// The shared store adapter
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// Construct an actor with the given identity and optional computation.
    /// Subscribes to the actor's notification channel; the actor is created
    /// stopped and posts work immediately, while execution needs `start`.
    pub async fn actor<I, O>(
        &self,
        id: impl Into<String>,
        computation: Option<Computation<I, O>>,
    ) -> Result<Actor<I, O>, ActorError>
    where
        I: Serialize + DeserializeOwned + Send + Sync + 'static,
        O: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let id = id.into();
        debug!(actor = %id, "creating actor");
        Actor::new(
            id,
            Arc::clone(&self.store),
            Arc::clone(&self.semaphore),
            self.config.clone(),
            computation,
        )
        .await
    }
}
