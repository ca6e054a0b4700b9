//! Single-flight execution for duplicate-suppressing expensive work.
//!
//! Concurrent segment requests that each decide an encoder restart is
//! needed must coalesce into one restart per (part, variant). This wraps
//! the `async_singleflight` crate so only one caller executes per key
//! while the rest wait for its result.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Error type for `SingleFlight` operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SingleFlightError<E> {
    /// The leader task panicked or was cancelled
    #[error("single-flight leader dropped or panicked")]
    LeaderFailed,
    /// The underlying operation failed
    #[error("{0}")]
    Inner(E),
}

/// Deduplicates concurrent executions by key.
///
/// When multiple tasks attempt the same operation simultaneously, one
/// proceeds and the others wait for its result. Leader failure is retried
/// by the underlying crate.
#[derive(Clone)]
pub struct SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    group: Arc<async_singleflight::Group<K, V, E>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Execute `f` once per concurrent set of callers sharing `key`.
    pub async fn run<Fut>(&self, key: K, f: Fut) -> Result<V, SingleFlightError<E>>
    where
        Fut: std::future::Future<Output = Result<V, E>> + Send,
    {
        // Group::work returns Result<V, Option<E>>:
        //   Ok(v)        => success
        //   Err(Some(e)) => inner error from the function
        //   Err(None)    => leader failed/dropped (after retry attempts)
        self.group.work(&key, f).await.map_err(|opt_err| match opt_err {
            Some(inner) => SingleFlightError::Inner(inner),
            None => SingleFlightError::LeaderFailed,
        })
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_concurrent_callers_coalesce() {
        let sf: SingleFlight<String, i32, String> = SingleFlight::new();
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let sf = sf.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                sf.run("part1:variant1".to_string(), async move {
                    sleep(Duration::from_millis(50)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let sf: SingleFlight<String, i32, String> = SingleFlight::new();
        let a = sf.run("a".to_string(), async { Ok(1) });
        let b = sf.run("b".to_string(), async { Ok(2) });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_error_propagates_and_key_recovers() {
        let sf: SingleFlight<String, i32, String> = SingleFlight::new();

        let result = sf
            .run("k".to_string(), async { Err("boom".to_string()) })
            .await;
        match result {
            Err(SingleFlightError::Inner(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected inner error, got {other:?}"),
        }

        let result = sf.run("k".to_string(), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
