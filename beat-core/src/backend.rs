//! External collaborators, described only at their interface boundary.
//!
//! Everything durable lives behind these traits; the resilience layer owns no
//! persisted schema of its own.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::watch;

use crate::{
    Connectivity, CounterError, CounterField, Identity, MediaRecord, MediaRecordId,
    ProfileDocument, StoreResult,
};

/// Source of identity changes (sign-in, sign-out, account switch).
///
/// The receiver yields `None` while signed out. Dropping it unsubscribes.
pub trait IdentitySource: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// Remote profile document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the profile document for `id`, `StoreError::NotFound` if absent
    async fn get(&self, id: &str) -> StoreResult<ProfileDocument>;

    /// Create (or overwrite) the profile document for `id`
    async fn create(&self, id: &str, doc: ProfileDocument) -> StoreResult<ProfileDocument>;

    /// Atomically add `delta` to a counter field of an existing document
    async fn increment(&self, id: &str, field: CounterField, delta: i64) -> StoreResult<()>;

    /// Re-arm the underlying transport after a connectivity loss
    async fn enable_network(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Catalog of uploaded media records
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn add(&self, record: MediaRecord) -> StoreResult<MediaRecordId>;

    async fn list_for_owner(&self, owner: &str) -> StoreResult<Vec<(MediaRecordId, MediaRecord)>>;
}

/// Host connectivity transitions (online/offline events, no payload)
pub trait ConnectivitySource: Send + Sync {
    fn subscribe(&self) -> BoxStream<'static, Connectivity>;
}

/// Capability to adjust the signed-in profile's counters.
///
/// Implemented by the session layer; upload code only ever sees this trait.
#[async_trait]
pub trait CounterWriter: Send + Sync {
    async fn write_counter(&self, field: CounterField, delta: i64) -> Result<(), CounterError>;
}
