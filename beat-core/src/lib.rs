//! # beat-core: shared ground for the beat client resilience layer
//!
//! `beat-core` holds everything the session, upload and cache crates agree on:
//!
//! - **Domain types**: [`Identity`], [`Profile`], [`ProfileDocument`], [`MediaRecord`]
//! - **Backend traits**: the external collaborators (identity provider, document
//!   store, media catalog, connectivity signal) described as async traits
//! - **Errors**: [`StoreError`] for document-store failures and [`CounterError`]
//!   for the best-effort counter capability
//! - **Configuration**: a small string key/value store with typed snapshots
//! - **Memory backends**: in-process implementations with failure injection,
//!   used by tests and the demo client
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ beat-client (NetworkMonitor) │
//! ├──────────────┬───────────────┤
//! │ beat-session │   beat-blob   │
//! ├──────────────┴───────────────┤
//! │          beat-core           │
//! └──────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
mod error;
pub mod memory;
mod types;

pub use backend::{ConnectivitySource, CounterWriter, DocumentStore, IdentitySource, MediaCatalog};
pub use config::{BeatConfig, BeatConfigSnapshot};
pub use error::{CounterError, StoreError, StoreResult};
pub use types::{
    Connectivity, CounterField, Identity, MediaRecord, MediaRecordId, PlanTier, Profile,
    ProfileDocument,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Connectivity, CounterField, CounterWriter, DocumentStore, Identity, IdentitySource,
        Profile, ProfileDocument, StoreError, StoreResult,
    };
}
