//! Correlation storage abstractions
//!
//! An [`AsyncContext`] is written when an asynchronous target invocation is
//! issued and claimed exactly once when the external system reports back.
//! The store is keyed by [`InvocationId`].
//!
//! All implementations follow the same policy:
//! - at most one context per invocation id (`put` on a live id fails)
//! - `take` is an atomic get-and-invalidate, so concurrent callbacks for the
//!   same id resolve to one winner and `ContextNotFound` for the rest
//! - entries expire after the store's TTL; expired entries are invisible to
//!   `get`/`take` and are physically removed by `purge_expired`

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Default lifetime of a stored context.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Correlation key for one outstanding asynchronous target call.
///
/// Always a string-encoded integer; construct via [`InvocationId::parse`] or
/// `From<i64>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvocationId(String);

impl InvocationId {
    /// Validate a raw id and store it in canonical decimal form, so
    /// `"042"` and `"+42"` key the same context as `From::<i64>::from(42)`.
    pub fn parse(raw: impl Into<String>) -> StorageResult<Self> {
        let raw = raw.into();
        match raw.parse::<i64>() {
            Ok(n) => Ok(InvocationId::from(n)),
            Err(_) => Err(StorageError::InvalidInvocationId { raw }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for InvocationId {
    fn from(id: i64) -> Self {
        InvocationId(id.to_string())
    }
}

impl TryFrom<String> for InvocationId {
    type Error = StorageError;

    fn try_from(raw: String) -> StorageResult<Self> {
        InvocationId::parse(raw)
    }
}

impl From<InvocationId> for String {
    fn from(id: InvocationId) -> Self {
        id.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the caller that issued an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Event republished after a callback so the downstream evaluation pass
/// picks the item up again. Carried through the store untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamEvent {
    pub space_id: i64,
    pub expt_id: i64,
    pub expt_run_id: i64,
    pub eval_set_item_id: i64,
    #[serde(default)]
    pub retry_times: u32,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub ext: BTreeMap<String, String>,
}

/// Correlation context persisted between issue and callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncContext {
    pub invocation_id: InvocationId,
    pub space_id: i64,
    /// Milliseconds since the Unix epoch, captured before the external call.
    pub issued_at_ms: i64,
    pub session: Session,
    /// Handle of the remote callee, as returned by the target service.
    pub callee: Option<String>,
    pub event: Option<DownstreamEvent>,
}

/// Durable invocation-id → context map.
#[async_trait]
pub trait AsyncCorrelationStore: Send + Sync {
    /// Persist a context. Fails with `ContextExists` if a live context is
    /// already stored under the same id.
    async fn put(&self, ctx: &AsyncContext) -> StorageResult<()>;

    /// Read a context without consuming it. Absence is an error.
    async fn get(&self, id: &InvocationId) -> StorageResult<AsyncContext>;

    /// Atomically read and remove a context. Absence is an error.
    async fn take(&self, id: &InvocationId) -> StorageResult<AsyncContext>;

    /// Remove every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> StorageResult<usize>;
}

pub(crate) fn expiry_ms(issued_at_ms: i64, ttl: Duration) -> i64 {
    issued_at_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}
