//! SurrealDB connection setup
//!
//! Supports an in-memory engine for tests and single-process runs, any engine
//! URL via `SURREALDB_URL`, and authenticated remote instances.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;

const DEFAULT_NAMESPACE: &str = "evalorch";
const DEFAULT_DATABASE: &str = "main";

/// How a remote connection authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signin {
    Root,
    Database,
}

/// An authenticated remote SurrealDB instance.
#[derive(Debug, Clone)]
pub struct RemoteStoreConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    pub signin: Signin,
}

impl RemoteStoreConfig {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `None` unless `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and
    /// `SURREALDB_PASSWORD` are all set. `SURREALDB_NAMESPACE` and
    /// `SURREALDB_DATABASE` fall back to `evalorch`/`main`;
    /// `SURREALDB_ROOT=true` selects root signin.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signin = match lookup("SURREALDB_ROOT") {
            Some(v) if v.eq_ignore_ascii_case("true") => Signin::Root,
            _ => Signin::Database,
        };
        Some(Self {
            endpoint: lookup("SURREALDB_ENDPOINT")?,
            username: lookup("SURREALDB_USERNAME")?,
            password: lookup("SURREALDB_PASSWORD")?,
            namespace: lookup("SURREALDB_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            database: lookup("SURREALDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            signin,
        })
    }
}

/// Connect to the in-memory engine and initialize the schema.
#[instrument(skip_all)]
pub async fn connect_in_memory() -> Result<Surreal<Any>, StateError> {
    connect_url("mem://").await
}

/// Connect to any engine URL with the default namespace and database.
#[instrument]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>, StateError> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!(url = %url, "SurrealDB connected");
    Ok(db)
}

/// Connect to an authenticated remote instance.
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub async fn connect_remote(config: &RemoteStoreConfig) -> Result<Surreal<Any>, StateError> {
    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    let signed_in = match config.signin {
        Signin::Root => db
            .signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map(|_| ()),
        Signin::Database => db
            .signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map(|_| ()),
    };
    signed_in
        .map_err(|e| StateError::Connection(format!("{:?} signin failed: {e}", config.signin)))?;

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    info!(signin = ?config.signin, "SurrealDB connected (remote)");
    Ok(db)
}

/// Connect using environment variables.
///
/// Remote config wins, then `SURREALDB_URL`, then the in-memory engine.
#[instrument(skip_all)]
pub async fn connect_from_env() -> Result<Surreal<Any>, StateError> {
    if let Some(config) = RemoteStoreConfig::from_env() {
        return connect_remote(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        return connect_url(&url).await;
    }

    info!("No SurrealDB config found, using in-memory database");
    connect_in_memory().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 3] = [
        ("SURREALDB_ENDPOINT", "wss://db.example"),
        ("SURREALDB_USERNAME", "svc"),
        ("SURREALDB_PASSWORD", "secret"),
    ];

    #[test]
    fn test_remote_config_defaults() {
        let config = RemoteStoreConfig::from_lookup(lookup(&CREDENTIALS)).unwrap();
        assert_eq!(config.endpoint, "wss://db.example");
        assert_eq!(config.namespace, "evalorch");
        assert_eq!(config.database, "main");
        assert_eq!(config.signin, Signin::Database);
    }

    #[test]
    fn test_remote_config_overrides() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("SURREALDB_NAMESPACE", "ns"),
            ("SURREALDB_DATABASE", "db"),
            ("SURREALDB_ROOT", "TRUE"),
        ]);
        let config = RemoteStoreConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.namespace, "ns");
        assert_eq!(config.database, "db");
        assert_eq!(config.signin, Signin::Root);
    }

    #[test]
    fn test_remote_config_needs_all_credentials() {
        for missing in 0..CREDENTIALS.len() {
            let pairs: Vec<_> = CREDENTIALS
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != missing)
                .map(|(_, kv)| *kv)
                .collect();
            assert!(RemoteStoreConfig::from_lookup(lookup(&pairs)).is_none());
        }
    }
}
