//! evalorch-state: correlation persistence for asynchronous target calls
//!
//! When an evaluation target is invoked asynchronously, the issuing side
//! records an [`AsyncContext`] keyed by [`InvocationId`]; the callback side
//! later claims it to attribute the result. This crate owns that state.
//!
//! ## Key Components
//!
//! - [`AsyncCorrelationStore`]: backend-agnostic store contract
//! - [`fakes::MemoryCorrelationStore`]: in-process implementation
//! - [`SurrealCorrelationStore`]: SurrealDB implementation with atomic claim

pub mod connection;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_correlation;

pub use connection::{RemoteStoreConfig, Signin};
pub use error::{StateError, StorageError};
pub use storage_traits::{
    AsyncContext, AsyncCorrelationStore, DownstreamEvent, InvocationId, Session, StorageResult,
    DEFAULT_CONTEXT_TTL,
};
pub use surreal_correlation::SurrealCorrelationStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
