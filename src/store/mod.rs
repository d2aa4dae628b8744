//! Document store seam.
//!
//! # Data Flow
//! ```text
//! Broker
//!     → Connector::open(target)   (one fresh client per call)
//!     → Session::ping()           (liveness probe)
//! Dispatcher
//!     → Session::{find, insert_*, update_many, delete_many, ...}
//! Broker
//!     → Session::close()
//! ```
//!
//! # Design Decisions
//! - The engine is reached only through these traits, so the broker and
//!   dispatcher never name a driver type
//! - Payloads travel as BSON documents; normalization to JSON happens in
//!   the dispatcher, not here
//! - `mongo.rs` is the production engine. `memory.rs` is an in-process one
//!   for tests, built only with the `test-util` feature

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use thiserror::Error;

use crate::broker::ConnectionTarget;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, Probe};
pub use mongo::MongoConnector;

/// Failure reported by the engine. The message is passed through verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        Self(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Database + collection pair an operation runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Match and modification counts of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// Opens sessions against a connection target.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, target: &ConnectionTarget) -> StoreResult<Box<dyn Session>>;
}

/// One live session to the engine, owned by a single call.
#[async_trait]
pub trait Session: Send + Sync {
    /// Administrative liveness check.
    async fn ping(&self) -> StoreResult<()>;

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>>;

    async fn create_collection(&self, ns: &Namespace) -> StoreResult<()>;

    /// All documents matching `filter`, in engine order.
    async fn find(&self, ns: &Namespace, filter: Document) -> StoreResult<Vec<Document>>;

    /// Returns the identifier the engine assigned (or kept) for the record.
    async fn insert_one(&self, ns: &Namespace, record: Document) -> StoreResult<Bson>;

    /// Returns identifiers in input order.
    async fn insert_many(&self, ns: &Namespace, records: Vec<Document>) -> StoreResult<Vec<Bson>>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateCounts>;

    /// Removes every document matching `filter`. Returns the deleted count.
    async fn delete_many(&self, ns: &Namespace, filter: Document) -> StoreResult<u64>;

    /// Tear the session down. Consumes it so it cannot be used afterwards.
    async fn close(self: Box<Self>);
}
