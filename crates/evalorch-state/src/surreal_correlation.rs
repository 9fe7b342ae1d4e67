//! SurrealDB-backed AsyncCorrelationStore implementation
//!
//! Each context lives at record id `async_ctx:<invocation_id>`. `take` is a
//! single `DELETE ... RETURN BEFORE` statement, so exactly one concurrent
//! caller observes the row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::connection;
use crate::error::{StateError, StorageError};
use crate::schema::AsyncContextRow;
use crate::storage_traits::{
    expiry_ms, AsyncContext, AsyncCorrelationStore, InvocationId, StorageResult,
    DEFAULT_CONTEXT_TTL,
};

/// SurrealDB-backed implementation of [`AsyncCorrelationStore`].
pub struct SurrealCorrelationStore {
    db: Surreal<Any>,
    ttl: Duration,
}

impl SurrealCorrelationStore {
    /// Wrap an existing connection. The schema must already be initialized.
    pub fn new(db: Surreal<Any>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> Result<Self, StateError> {
        let db = connection::connect_in_memory().await?;
        info!("SurrealCorrelationStore connected (in-memory)");
        Ok(Self::new(db, DEFAULT_CONTEXT_TTL))
    }

    /// Connect using the environment variable chain of
    /// [`connection::connect_from_env`].
    pub async fn from_env(ttl: Duration) -> Result<Self, StateError> {
        let db = connection::connect_from_env().await?;
        Ok(Self::new(db, ttl))
    }

    fn backend(e: surrealdb::Error) -> StorageError {
        StorageError::Backend(e.to_string())
    }

    fn not_found(id: &InvocationId) -> StorageError {
        StorageError::ContextNotFound {
            invocation_id: id.as_str().to_string(),
        }
    }

    fn live(row: AsyncContextRow, id: &InvocationId, now: i64) -> StorageResult<AsyncContext> {
        if row.expires_at_ms <= now {
            debug!(invocation_id = %id, "async context expired");
            return Err(Self::not_found(id));
        }
        row.into_context()
    }
}

#[async_trait]
impl AsyncCorrelationStore for SurrealCorrelationStore {
    async fn put(&self, ctx: &AsyncContext) -> StorageResult<()> {
        let now = Utc::now().timestamp_millis();
        let row = AsyncContextRow::from_context(ctx, expiry_ms(now, self.ttl))?;
        let id = ctx.invocation_id.as_str().to_string();

        debug!(invocation_id = %id, "storing async context");

        // A stale row for the same id must not block a fresh issue.
        let res = self
            .db
            .query("DELETE async_ctx WHERE invocation_id = $id AND expires_at_ms <= $now")
            .query("CREATE type::thing('async_ctx', $id) CONTENT $row")
            .bind(("id", id.clone()))
            .bind(("now", now))
            .bind(("row", row))
            .await
            .map_err(Self::backend)?;

        res.check().map_err(|e| {
            let msg = e.to_string();
            if msg.contains("already exists") {
                StorageError::ContextExists { invocation_id: id }
            } else {
                StorageError::Backend(msg)
            }
        })?;

        Ok(())
    }

    async fn get(&self, id: &InvocationId) -> StorageResult<AsyncContext> {
        let now = Utc::now().timestamp_millis();
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('async_ctx', $id)")
            .bind(("id", id.as_str().to_string()))
            .await
            .map_err(Self::backend)?;

        let rows: Vec<AsyncContextRow> = res.take(0).map_err(Self::backend)?;
        let row = rows.into_iter().next().ok_or_else(|| Self::not_found(id))?;
        Self::live(row, id, now)
    }

    async fn take(&self, id: &InvocationId) -> StorageResult<AsyncContext> {
        let now = Utc::now().timestamp_millis();
        let mut res = self
            .db
            .query("DELETE type::thing('async_ctx', $id) RETURN BEFORE")
            .bind(("id", id.as_str().to_string()))
            .await
            .map_err(Self::backend)?;

        let rows: Vec<AsyncContextRow> = res.take(0).map_err(Self::backend)?;
        let row = rows.into_iter().next().ok_or_else(|| Self::not_found(id))?;
        Self::live(row, id, now)
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = Utc::now().timestamp_millis();
        let mut res = self
            .db
            .query("DELETE async_ctx WHERE expires_at_ms <= $now RETURN BEFORE")
            .bind(("now", now))
            .await
            .map_err(Self::backend)?;

        let removed: Vec<AsyncContextRow> = res.take(0).map_err(Self::backend)?;
        if !removed.is_empty() {
            info!(removed = removed.len(), "purged expired async contexts");
        }
        Ok(removed.len())
    }
}
