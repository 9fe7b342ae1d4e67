//! SurrealDB schema initialization
//!
//! Safe to call on every connection (all statements are idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;

/// Initialize all evalorch tables.
pub async fn init_schema(db: &Surreal<Any>) -> Result<(), StateError> {
    info!("Initializing evalorch SurrealDB schema");
    init_async_ctx_table(db).await?;
    info!("evalorch schema initialization complete");
    Ok(())
}

/// Initialize the `async_ctx` table.
///
/// Schema:
/// ```text
/// TABLE async_ctx {
///   id:             RECORD async_ctx:<invocation_id>
///   invocation_id:  STRING (unique)
///   space_id:       INT
///   issued_at_ms:   INT
///   expires_at_ms:  INT (indexed, drives purge)
///   callee:         STRING?
///   session_json:   STRING
///   event_json:     STRING?
/// }
/// ```
///
/// Rows are created once per invocation and deleted when the callback claims
/// them; they are never updated.
async fn init_async_ctx_table(db: &Surreal<Any>) -> Result<(), StateError> {
    debug!("Initializing async_ctx table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS async_ctx SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_async_ctx_invocation ON TABLE async_ctx COLUMNS invocation_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_async_ctx_expires ON TABLE async_ctx COLUMNS expires_at_ms;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

    Ok(())
}
