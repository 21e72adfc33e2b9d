//! Distributed lock (C7) — owner-keyed mutual exclusion with TTL, realized
//! as a single-row-per-key upsert on the same Postgres database as the rest
//! of the core.
//!
//! `acquire` is the standard "steal an expired lock" upsert: `INSERT ... ON
//! CONFLICT (lock_key) DO UPDATE ... WHERE distributed_locks.expires_at <
//! now()`, reporting acquisition success from the affected row count.
//! `release` is a compare-and-delete keyed on the owner value.

use chrono::Utc;
use futures::FutureExt;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use std::{future::Future, panic::AssertUnwindSafe, time::Duration};
use uuid::Uuid;

use crate::error::{IngestError, Result};

#[derive(Clone)]
pub struct DistributedLock {
    db: DatabaseConnection,
}

impl DistributedLock {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let sql = r#"
            INSERT INTO distributed_locks (lock_key, owner, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (lock_key) DO UPDATE
                SET owner = excluded.owner, expires_at = excluded.expires_at
                WHERE distributed_locks.expires_at < now()
        "#;
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                [key.into(), owner.into(), expires_at.into()],
            ))
            .await
            .map_err(|err| IngestError::TransientStateError(err.into()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-delete: only releases the lock if `owner` still matches
    /// the stored value, so a lock that was stolen after TTL expiry isn't
    /// released out from under its new holder.
    pub async fn release(&self, key: &str, owner: &str) -> Result<bool> {
        let sql = r#"DELETE FROM distributed_locks WHERE lock_key = $1 AND owner = $2"#;
        let result = self
            .db
            .execute(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                [key.into(), owner.into()],
            ))
            .await
            .map_err(|err| IngestError::TransientStateError(err.into()))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let sql = r#"SELECT 1 FROM distributed_locks WHERE lock_key = $1 AND expires_at >= now()"#;
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                [key.into()],
            ))
            .await
            .map_err(|err| IngestError::TransientStateError(err.into()))?;
        Ok(row.is_some())
    }

    /// Generates a per-call owner nonce, calls `f` iff the lock is acquired,
    /// and releases it on return — success, error, or panic. There is no
    /// guard struct: `Drop` can't `await`, so the release itself can't run
    /// from one. Instead `f` runs under `catch_unwind`, the release happens
    /// unconditionally before we look at the outcome, and a caught panic is
    /// resumed afterwards so it still propagates to the caller.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, ttl: Duration, f: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let owner = Uuid::new_v4().to_string();
        if !self.acquire(key, &owner, ttl).await? {
            return Ok(None);
        }

        let result = AssertUnwindSafe(f()).catch_unwind().await;

        // Release regardless of outcome; a failure to release is logged but
        // not fatal — the lock's own TTL is the correctness backstop.
        if let Err(release_err) = self.release(key, &owner).await {
            tracing::warn!(error = ?release_err, lock_key = key, "failed to release distributed lock, relying on TTL expiry");
        }

        match result {
            Ok(inner) => inner.map(Some),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockscout_service_launcher::test_database::TestDbGuard;
    use migration::Migrator;

    #[tokio::test]
    async fn second_acquire_fails_while_first_holds() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_lock").await;
        let lock = DistributedLock::new(db_guard.client().as_ref().clone());

        assert!(lock
            .acquire("upload:processing:u1", "owner-a", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!lock
            .acquire("upload:processing:u1", "owner-b", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn release_requires_matching_owner() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_lock_release").await;
        let lock = DistributedLock::new(db_guard.client().as_ref().clone());

        lock.acquire("upload:processing:u2", "owner-a", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!lock.release("upload:processing:u2", "owner-b").await.unwrap());
        assert!(lock.release("upload:processing:u2", "owner-a").await.unwrap());
        assert!(!lock.exists("upload:processing:u2").await.unwrap());
    }

    #[tokio::test]
    async fn expired_lock_can_be_stolen() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_lock_steal").await;
        let lock = DistributedLock::new(db_guard.client().as_ref().clone());

        lock.acquire(
            "upload:processing:u3",
            "owner-a",
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(lock
            .acquire("upload:processing:u3", "owner-b", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn with_lock_runs_closure_and_releases() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_lock_with").await;
        let lock = DistributedLock::new(db_guard.client().as_ref().clone());

        let result = lock
            .with_lock("upload:processing:u4", Duration::from_secs(60), || async {
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(result, Some(42));
        assert!(!lock.exists("upload:processing:u4").await.unwrap());
    }

    #[tokio::test]
    async fn with_lock_returns_none_when_already_held() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_lock_contended").await;
        let lock = DistributedLock::new(db_guard.client().as_ref().clone());

        lock.acquire("upload:processing:u5", "owner-a", Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<()> = lock
            .with_lock("upload:processing:u5", Duration::from_secs(60), || async {
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn with_lock_releases_even_if_closure_panics() {
        let db_guard = TestDbGuard::new::<Migrator>("cnab_ingest_lock_panic").await;
        let lock = DistributedLock::new(db_guard.client().as_ref().clone());

        let call = lock.with_lock::<_, _, ()>(
            "upload:processing:u6",
            Duration::from_secs(60),
            || async { panic!("boom") },
        );
        let outcome = AssertUnwindSafe(call).catch_unwind().await;
        assert!(outcome.is_err());
        assert!(!lock.exists("upload:processing:u6").await.unwrap());
    }
}
