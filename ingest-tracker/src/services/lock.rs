//! Distributed per-key locks
//!
//! The lock table lives in the shared database, so every tracker instance
//! pointing at the same file sees the same locks. Each acquisition carries a
//! fresh owner token and a lease; an expired lease may be taken over, which
//! keeps a crashed holder from blocking its key forever.

use async_trait::async_trait;
use ingest_common::time::now_millis;
use ingest_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Proof of holding `key`; pass it back to `unlock`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    pub owner: Uuid,
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Take `key` if free (or its lease has run out); never waits
    async fn try_lock(&self, key: &str) -> Result<Option<LockHandle>>;

    /// Release a lock taken by `try_lock`; a lock lost to lease expiry is left alone
    async fn unlock(&self, handle: LockHandle) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteLockService {
    pool: SqlitePool,
    lease: Duration,
}

impl SqliteLockService {
    pub fn new(pool: SqlitePool, lease: Duration) -> Self {
        Self { pool, lease }
    }
}

#[async_trait]
impl LockService for SqliteLockService {
    async fn try_lock(&self, key: &str) -> Result<Option<LockHandle>> {
        let owner = Uuid::new_v4();
        let now = now_millis();
        let lease_ms = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(lease_ms);

        // Insert, or take over a row whose lease has expired. A live row
        // makes the WHERE false and nothing changes.
        let rows = sqlx::query(
            r#"
            INSERT INTO distributed_locks (lock_key, owner, acquired_at_ms, expires_at_ms)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(lock_key) DO UPDATE SET
                owner = excluded.owner,
                acquired_at_ms = excluded.acquired_at_ms,
                expires_at_ms = excluded.expires_at_ms
            WHERE distributed_locks.expires_at_ms <= excluded.acquired_at_ms
            "#,
        )
        .bind(key)
        .bind(owner.to_string())
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        if rows == 1 {
            tracing::debug!(lock_key = key, owner = %owner, "Lock acquired");
            Ok(Some(LockHandle {
                key: key.to_string(),
                owner,
            }))
        } else {
            tracing::debug!(lock_key = key, "Lock held elsewhere");
            Ok(None)
        }
    }

    async fn unlock(&self, handle: LockHandle) -> Result<()> {
        let rows = sqlx::query("DELETE FROM distributed_locks WHERE lock_key = ? AND owner = ?")
            .bind(&handle.key)
            .bind(handle.owner.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            tracing::warn!(
                lock_key = %handle.key,
                owner = %handle.owner,
                "Lock already gone at release; lease expired while held"
            );
        } else {
            tracing::debug!(lock_key = %handle.key, "Lock released");
        }
        Ok(())
    }
}

/// Poll `try_lock` with backoff (10ms doubling, 250ms cap) for up to `max_wait`.
///
/// `Ok(None)` means the key stayed taken for the whole wait.
pub async fn acquire(
    locks: &dyn LockService,
    key: &str,
    max_wait: Duration,
) -> Result<Option<LockHandle>> {
    let started = Instant::now();
    let mut backoff = Duration::from_millis(10);

    loop {
        if let Some(handle) = locks.try_lock(key).await? {
            return Ok(Some(handle));
        }

        let elapsed = started.elapsed();
        if elapsed >= max_wait {
            tracing::warn!(
                lock_key = key,
                waited_ms = elapsed.as_millis() as u64,
                "Gave up waiting for lock"
            );
            return Ok(None);
        }

        let remaining = max_wait - elapsed;
        tokio::time::sleep(backoff.min(remaining)).await;
        backoff = (backoff * 2).min(Duration::from_millis(250));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;
    use ingest_common::db::{init_database_pool, PoolSettings};
    use tempfile::TempDir;

    async fn pool(dir: &TempDir) -> SqlitePool {
        let pool = init_database_pool(&dir.path().join("locks.db"), PoolSettings::default())
            .await
            .unwrap();
        init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn second_holder_is_refused_until_release() {
        let dir = TempDir::new().unwrap();
        let locks = SqliteLockService::new(pool(&dir).await, Duration::from_secs(30));

        let first = locks.try_lock("debias:1").await.unwrap().unwrap();
        assert!(locks.try_lock("debias:1").await.unwrap().is_none());

        locks.unlock(first).await.unwrap();
        assert!(locks.try_lock("debias:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn keys_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let locks = SqliteLockService::new(pool(&dir).await, Duration::from_secs(30));

        assert!(locks.try_lock("debias:1").await.unwrap().is_some());
        assert!(locks.try_lock("debias:2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let locks = SqliteLockService::new(pool(&dir).await, Duration::from_millis(20));

        let stale = locks.try_lock("debias:9").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh = locks.try_lock("debias:9").await.unwrap().unwrap();
        assert_ne!(stale.owner, fresh.owner);

        // The stale holder's release must not free the new holder's lock
        locks.unlock(stale).await.unwrap();
        assert!(locks.try_lock("debias:9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acquire_gives_up_after_wait() {
        let dir = TempDir::new().unwrap();
        let locks = SqliteLockService::new(pool(&dir).await, Duration::from_secs(30));

        let _held = locks.try_lock("debias:3").await.unwrap().unwrap();
        let waited = acquire(&locks, "debias:3", Duration::from_millis(50)).await.unwrap();
        assert!(waited.is_none());
    }
}
