//! Database row for a stored [`AsyncContext`].
//!
//! Session and event are kept as JSON text columns so the stored shape does
//! not depend on how the database maps nested JSON values.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{AsyncContext, InvocationId, StorageResult};

/// One row per outstanding invocation in the `async_ctx` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncContextRow {
    /// SurrealDB record ID, `async_ctx:<invocation_id>`. Set by the query.
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub invocation_id: String,
    pub space_id: i64,
    pub issued_at_ms: i64,
    pub expires_at_ms: i64,
    pub callee: Option<String>,
    pub session_json: String,
    pub event_json: Option<String>,
}

impl AsyncContextRow {
    pub fn from_context(ctx: &AsyncContext, expires_at_ms: i64) -> StorageResult<Self> {
        Ok(Self {
            id: None,
            invocation_id: ctx.invocation_id.as_str().to_string(),
            space_id: ctx.space_id,
            issued_at_ms: ctx.issued_at_ms,
            expires_at_ms,
            callee: ctx.callee.clone(),
            session_json: serde_json::to_string(&ctx.session)?,
            event_json: ctx.event.as_ref().map(serde_json::to_string).transpose()?,
        })
    }

    pub fn into_context(self) -> StorageResult<AsyncContext> {
        let invocation_id = InvocationId::parse(self.invocation_id)?;
        let session = serde_json::from_str(&self.session_json)
            .map_err(|e| StorageError::Serialization(format!("session column: {e}")))?;
        let event = self
            .event_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StorageError::Serialization(format!("event column: {e}")))?;

        Ok(AsyncContext {
            invocation_id,
            space_id: self.space_id,
            issued_at_ms: self.issued_at_ms,
            session,
            callee: self.callee,
            event,
        })
    }
}
