//! # beat-client: connectivity monitoring and component wiring
//!
//! [`NetworkMonitor`] debounces raw host connectivity events and acts on the
//! transitions that survive the quiet window:
//!
//! - **online**: re-arm the session's document store (re-resolving a session
//!   that never reached `Ready`) and revalidate degraded media
//! - **offline**: mark the session offline, keeping everything already loaded
//!
//! [`BeatClient`] wires the session, uploads, media cache and monitor over a
//! set of [`Backends`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beat_blob::memory::{MemoryFetcher, MemoryObjectStore};
//! use beat_client::{Backends, BeatClient, ClientConfig};
//! use beat_core::memory::{
//!     MemoryConnectivity, MemoryDocumentStore, MemoryIdentitySource, MemoryMediaCatalog,
//! };
//! use beat_core::Identity;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let identities = MemoryIdentitySource::new();
//! let client = BeatClient::start(
//!     Backends {
//!         identity: Arc::new(identities.clone()),
//!         documents: Arc::new(MemoryDocumentStore::new()),
//!         catalog: Arc::new(MemoryMediaCatalog::new()),
//!         objects: Arc::new(MemoryObjectStore::new()),
//!         fetcher: Arc::new(MemoryFetcher::new()),
//!         connectivity: Arc::new(MemoryConnectivity::new()),
//!     },
//!     ClientConfig::from_env(),
//! );
//!
//! identities.sign_in(Identity::new("user-123"));
//! let snapshot = client.session().wait_until_resolved().await;
//! println!("session is {}", snapshot.state.name());
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod monitor;
mod telemetry;

pub use client::{Backends, BeatClient};
pub use config::{ClientConfig, MonitorConfig, ENV_PREFIX};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{MonitorHandle, NetworkMonitor};
pub use telemetry::init_tracing;
