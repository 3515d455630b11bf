use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use troupe::{computation, Computation, MemoryStore, Troupe, TroupeConfig};

/// A troupe over a fresh in-memory store
pub fn test_troupe() -> Troupe {
    Troupe::new(MemoryStore::new())
}

pub fn test_troupe_with(config: TroupeConfig) -> Troupe {
    Troupe::with_config(MemoryStore::new(), config)
}

/// Identity computation
pub fn echo() -> Computation<i64, i64> {
    computation(|x: i64| async move { Ok(x) })
}

/// Computation that records every input it sees before echoing it
pub fn capture<T>(sink: Arc<Mutex<Vec<T>>>) -> Computation<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    computation(move |input: T| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().await.push(input.clone());
            Ok(input)
        }
    })
}

/// Poll a condition until it holds or five seconds pass
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
