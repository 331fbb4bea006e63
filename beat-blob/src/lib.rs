//! # beat-blob: media uploads and local media handles
//!
//! Two halves of the media path that must keep working on a flaky network:
//!
//! - **Uploads**: [`UploadCoordinator`] validates a file before touching the
//!   network, gives it a storage-safe unique name, runs a resumable transfer
//!   with progress and cancellation, and classifies any failure into a closed
//!   [`UploadError`] set with stable user messages. Follow-up writes (catalog
//!   record, profile counter, cache warm-up) are best-effort and never undo a
//!   stored object.
//! - **Playback**: [`MediaCache`] turns remote media into locally owned,
//!   ref-counted [`MediaHandle`]s. Concurrent requests share one fetch, the
//!   last release revokes the handle, and failed fetches degrade the entry
//!   until it is revalidated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beat_blob::prelude::*;
//! use beat_blob::memory::{MemoryFetcher, MemoryObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let cache = MediaCache::new(Arc::new(MemoryFetcher::new()));
//! let uploads = UploadCoordinator::new(MemoryObjectStore::new(), BlobConfig::default())
//!     .with_cache(cache.clone());
//!
//! let source = UploadSource::new("My Beat.mp3", vec![0u8; 1024]).with_content_type("audio/mpeg");
//! let metadata = MediaMetadata::new("My Beat", 92, "A minor", "Lo-fi");
//!
//! let task = uploads.submit("user-123", source, metadata)?;
//! if let UploadOutcome::Succeeded { receipt, .. } = task.wait().await {
//!     if let Ok(handle) = cache.acquire(&receipt.url).await {
//!         println!("play {}", handle.url());
//!         cache.release(&receipt.url);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod coordinator;
mod error;
pub mod memory;
mod progress;
mod receipt;
pub mod store;
mod types;
mod upload;

// Re-export main types for clean API
pub use cache::{CacheStats, MediaCache, MediaHandle};
pub use config::BlobConfig;
pub use coordinator::UploadCoordinator;
pub use error::{CacheError, CacheResult, FetchError, ObjectStoreError, UploadError, UploadResult};
pub use progress::ProgressReporter;
pub use receipt::MediaReceipt;
pub use store::{
    sanitize_file_name, CrossOriginFetch, DefaultKeyStrategy, FetchedMedia, MediaKeyStrategy,
    ObjectStore, PutResult, StoreCapabilities,
};
pub use types::{
    Bookkeeping, FetchMode, MediaMetadata, UploadEvent, UploadId, UploadJob, UploadOutcome,
    UploadProgress, UploadSource, UploadState,
};
pub use upload::UploadTask;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobConfig, CacheError, MediaCache, MediaHandle, MediaMetadata, MediaReceipt,
        UploadCoordinator, UploadError, UploadEvent, UploadOutcome, UploadResult, UploadSource,
        UploadTask,
    };
}
