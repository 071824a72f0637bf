//! Distributed token-bucket admission
//!
//! Buckets live in the shared database so every instance draws from the same
//! budget. One UPSERT per request creates the bucket on first use, refills it
//! at interval boundaries and takes a token; concurrent requests serialize on
//! the row, so a token is never handed out twice.

use ingest_common::time::{millis_to_duration, now_millis};
use ingest_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::db::MAX_LOCK_WAIT_MS;
use crate::utils::retry_on_lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    /// Wait until the next refill; never longer than the refill interval
    Rejected { retry_after: Duration },
}

#[derive(Clone)]
pub struct RateGate {
    pool: SqlitePool,
    capacity: u32,
    refill_interval: Duration,
}

impl RateGate {
    pub fn new(pool: SqlitePool, capacity: u32, refill_interval: Duration) -> Self {
        Self {
            pool,
            capacity: capacity.max(1),
            refill_interval: refill_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub async fn try_acquire(&self, identity: &str) -> Result<Admission> {
        self.try_acquire_at(identity, now_millis()).await
    }

    /// Same as `try_acquire` with an explicit clock reading (milliseconds since epoch)
    pub async fn try_acquire_at(&self, identity: &str, now_ms: i64) -> Result<Admission> {
        let interval_ms = i64::try_from(self.refill_interval.as_millis()).unwrap_or(i64::MAX);
        let capacity = i64::from(self.capacity);

        // SET expressions all see the row as it was before this statement.
        // The refill point advances by whole intervals so buckets keep a
        // fixed cadence no matter when requests arrive.
        let (tokens, refilled_at_ms, consumed): (i64, i64, i64) =
            retry_on_lock("rate gate", MAX_LOCK_WAIT_MS, || async {
                sqlx::query_as(
                    r#"
                    INSERT INTO rate_buckets (identity, tokens, refilled_at_ms, consumed)
                    VALUES (?1, ?2 - 1, ?3, 1)
                    ON CONFLICT(identity) DO UPDATE SET
                        tokens = CASE
                            WHEN ?3 >= rate_buckets.refilled_at_ms + ?4 THEN ?2 - 1
                            WHEN rate_buckets.tokens > 0 THEN rate_buckets.tokens - 1
                            ELSE 0
                        END,
                        consumed = CASE
                            WHEN ?3 >= rate_buckets.refilled_at_ms + ?4 THEN 1
                            WHEN rate_buckets.tokens > 0 THEN 1
                            ELSE 0
                        END,
                        refilled_at_ms = CASE
                            WHEN ?3 >= rate_buckets.refilled_at_ms + ?4 THEN
                                rate_buckets.refilled_at_ms
                                    + ((?3 - rate_buckets.refilled_at_ms) / ?4) * ?4
                            ELSE rate_buckets.refilled_at_ms
                        END
                    RETURNING tokens, refilled_at_ms, consumed
                    "#,
                )
                .bind(identity)
                .bind(capacity)
                .bind(now_ms)
                .bind(interval_ms)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)
            })
            .await?;

        if consumed == 1 {
            let remaining = u32::try_from(tokens.max(0)).unwrap_or(0);
            tracing::trace!(identity, remaining, "Request admitted");
            return Ok(Admission::Allowed { remaining });
        }

        let next_refill = refilled_at_ms.saturating_add(interval_ms);
        let retry_after = millis_to_duration(next_refill - now_ms).min(self.refill_interval);
        tracing::debug!(
            identity,
            retry_after_ms = retry_after.as_millis() as u64,
            "Request rejected, bucket empty"
        );
        Ok(Admission::Rejected { retry_after })
    }
}
