//! # beat-session: identity to profile resolution
//!
//! [`SessionManager`] turns identity changes into a usable [`SessionSnapshot`].
//! Resolution is an explicit state machine with a bounded retry loop:
//!
//! ```text
//! Idle ─▶ Authenticating ─▶ FetchingProfile ─┬─▶ Ready
//!                                ▲           ├─▶ Creating ─▶ Ready
//!                                └─ Retrying ◀┤
//!                                             └─▶ Degraded
//! ```
//!
//! Whatever the document store does, resolution converges on `Ready` or
//! `Degraded`; the `loading` flag is only cleared there.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beat_core::memory::{MemoryDocumentStore, MemoryIdentitySource};
//! use beat_core::Identity;
//! use beat_session::{SessionConfig, SessionManager};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let identities = MemoryIdentitySource::new();
//! let manager = SessionManager::new(Arc::new(MemoryDocumentStore::new()), SessionConfig::default());
//! let _subscription = manager.start(&identities);
//!
//! identities.sign_in(Identity::new("user-123"));
//! let snapshot = manager.wait_until_resolved().await;
//! assert!(!snapshot.loading());
//! # }
//! ```

mod config;
mod manager;
mod state;

pub use config::SessionConfig;
pub use manager::{SessionManager, SessionSubscription};
pub use state::{DegradeReason, ResolutionState, SessionSnapshot};
