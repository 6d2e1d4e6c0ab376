//! Idempotency key claims.
//!
//! A claim is first-writer-wins within a TTL window. Claims are retained
//! on success so replays keep failing as duplicates, and released on
//! business failure so a corrected retry may pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::IngestError;

/// Default claim window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Trait for idempotency key claims.
#[async_trait]
pub trait IdempotencyGuard: Clone + Send + Sync + 'static {
    /// Claims the key. Fails with [`IngestError::DuplicateRequest`] when
    /// the key is already claimed and its window has not expired.
    async fn claim(&self, key: &str) -> Result<(), IngestError>;

    /// Releases a claim so the caller may retry with the same key.
    async fn release(&self, key: &str) -> Result<(), IngestError>;
}

/// In-memory guard for tests and single-process deployments.
#[derive(Debug, Clone)]
pub struct InMemoryIdempotencyGuard {
    claims: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl InMemoryIdempotencyGuard {
    /// Creates a guard with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Creates a guard with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            claims: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the number of live claims.
    pub fn claim_count(&self) -> usize {
        let mut claims = self.claims.lock().unwrap();
        let ttl = self.ttl;
        claims.retain(|_, at| at.elapsed() < ttl);
        claims.len()
    }
}

impl Default for InMemoryIdempotencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyGuard {
    async fn claim(&self, key: &str) -> Result<(), IngestError> {
        let mut claims = self.claims.lock().unwrap();
        let ttl = self.ttl;
        claims.retain(|_, at| at.elapsed() < ttl);

        if claims.contains_key(key) {
            return Err(IngestError::DuplicateRequest {
                key: key.to_string(),
            });
        }
        claims.insert(key.to_string(), Instant::now());
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), IngestError> {
        self.claims.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Postgres-backed guard shared across processes.
#[derive(Debug, Clone)]
pub struct PostgresIdempotencyGuard {
    pool: PgPool,
    ttl: Duration,
}

impl PostgresIdempotencyGuard {
    /// Creates a guard over the given pool with the default TTL.
    pub fn new(pool: PgPool) -> Self {
        Self::with_ttl(pool, DEFAULT_TTL)
    }

    /// Creates a guard with a custom TTL.
    pub fn with_ttl(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl IdempotencyGuard for PostgresIdempotencyGuard {
    async fn claim(&self, key: &str) -> Result<(), IngestError> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::seconds(300));

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM idempotency_keys WHERE claimed_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        let inserted = sqlx::query(
            "INSERT INTO idempotency_keys (key) VALUES ($1) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if inserted == 0 {
            return Err(IngestError::DuplicateRequest {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), IngestError> {
        sqlx::query("DELETE FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_claim_wins() {
        let guard = InMemoryIdempotencyGuard::new();

        guard.claim("order-1").await.unwrap();
        let err = guard.claim("order-1").await.unwrap_err();

        assert!(matches!(err, IngestError::DuplicateRequest { key } if key == "order-1"));
    }

    #[tokio::test]
    async fn test_release_allows_retry() {
        let guard = InMemoryIdempotencyGuard::new();

        guard.claim("order-1").await.unwrap();
        guard.release("order-1").await.unwrap();
        guard.claim("order-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_claims_are_swept() {
        let guard = InMemoryIdempotencyGuard::with_ttl(Duration::from_millis(10));

        guard.claim("order-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        guard.claim("order-1").await.unwrap();
        assert_eq!(guard.claim_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_conflict() {
        let guard = InMemoryIdempotencyGuard::new();
        guard.claim("order-1").await.unwrap();
        guard.claim("order-2").await.unwrap();
        assert_eq!(guard.claim_count(), 2);
    }
}
