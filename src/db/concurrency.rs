use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::topology::TopologyError;

/// Resource serialised by the lock registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Route(i64),
    Jc(i64),
    Path(i64),
    Ring(i64),
}

/// Per-resource async locks. Acquire in the order route → jc → path.
#[derive(Default)]
pub struct LockRegistry {
    locks: StdMutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > 1024 {
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks.entry(key).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

/// True for SQLite BUSY/LOCKED failures anywhere in the error chain
pub fn is_busy(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => {
            matches!(db.code().as_deref(), Some("5") | Some("6") | Some("517"))
                || db.message().contains("database is locked")
        }
        Some(sqlx::Error::PoolTimedOut) => true,
        _ => false,
    })
}

/// Run a transactional operation, retrying once if SQLite reports the
/// database busy. A second busy failure becomes `TopologyError::Conflict`.
pub async fn retry_once<T, F, Fut>(what: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match op().await {
        Err(e) if is_busy(&e) => {
            tracing::warn!("{} lost a write race, retrying: {}", what, e);
            match op().await {
                Err(e) if is_busy(&e) => Err(TopologyError::Conflict(what.to_string()).into()),
                other => other,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let registry = Arc::new(LockRegistry::default());
        let guard = registry.lock(LockKey::Jc(1)).await;

        let other = registry.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock(LockKey::Jc(1)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // A different key is independent
        let _route = registry.lock(LockKey::Route(1)).await;

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_once_passes_through_other_errors() {
        let calls = &AtomicU32::new(0);
        let result: anyhow::Result<()> = retry_once("op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("boom"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_once_retries_pool_timeout() {
        let calls = &AtomicU32::new(0);
        let result: anyhow::Result<u32> = retry_once("op", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(sqlx::Error::PoolTimedOut.into())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);

        let result: anyhow::Result<()> =
            retry_once("splice create", || async { Err(sqlx::Error::PoolTimedOut.into()) }).await;
        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TopologyError>(),
            Some(&TopologyError::Conflict("splice create".into()))
        );
    }
}
