//! In-memory correlation store
//!
//! `MemoryCorrelationStore` satisfies the [`AsyncCorrelationStore`] contract
//! without any external dependency. Used by tests and by single-process
//! deployments that do not need callbacks to survive a restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Clone)]
struct Entry {
    ctx: AsyncContext,
    expires_at_ms: i64,
}

/// In-memory store backed by a `HashMap<invocation id, entry>`.
#[derive(Debug)]
pub struct MemoryCorrelationStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for MemoryCorrelationStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_CONTEXT_TTL)
    }
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(id: &InvocationId) -> StorageError {
        StorageError::ContextNotFound {
            invocation_id: id.as_str().to_string(),
        }
    }
}

#[async_trait]
impl AsyncCorrelationStore for MemoryCorrelationStore {
    async fn put(&self, ctx: &AsyncContext) -> StorageResult<()> {
        let now = Utc::now().timestamp_millis();
        let mut entries = self.lock();
        if let Some(existing) = entries.get(ctx.invocation_id.as_str()) {
            if existing.expires_at_ms > now {
                return Err(StorageError::ContextExists {
                    invocation_id: ctx.invocation_id.as_str().to_string(),
                });
            }
        }
        entries.insert(
            ctx.invocation_id.as_str().to_string(),
            Entry {
                ctx: ctx.clone(),
                expires_at_ms: expiry_ms(now, self.ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &InvocationId) -> StorageResult<AsyncContext> {
        let now = Utc::now().timestamp_millis();
        let entries = self.lock();
        entries
            .get(id.as_str())
            .filter(|e| e.expires_at_ms > now)
            .map(|e| e.ctx.clone())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn take(&self, id: &InvocationId) -> StorageResult<AsyncContext> {
        let now = Utc::now().timestamp_millis();
        let mut entries = self.lock();
        match entries.remove(id.as_str()) {
            Some(entry) if entry.expires_at_ms > now => Ok(entry.ctx),
            _ => Err(Self::not_found(id)),
        }
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = Utc::now().timestamp_millis();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at_ms > now);
        Ok(before - entries.len())
    }
}
