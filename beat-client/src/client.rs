use std::sync::Arc;

use beat_blob::{
    CrossOriginFetch, MediaCache, MediaMetadata, ObjectStore, UploadCoordinator, UploadError,
    UploadResult, UploadSource, UploadTask,
};
use beat_core::{
    Connectivity, ConnectivitySource, DocumentStore, IdentitySource, MediaCatalog, MediaRecord,
    MediaRecordId, StoreResult,
};
use beat_session::{SessionManager, SessionSnapshot, SessionSubscription};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{ClientConfig, MonitorHandle, MonitorResult, NetworkMonitor};

/// External collaborators the client is built on
#[derive(Clone)]
pub struct Backends {
    pub identity: Arc<dyn IdentitySource>,
    pub documents: Arc<dyn DocumentStore>,
    pub catalog: Arc<dyn MediaCatalog>,
    pub objects: Arc<dyn ObjectStore>,
    pub fetcher: Arc<dyn CrossOriginFetch>,
    pub connectivity: Arc<dyn ConnectivitySource>,
}

/// Session, uploads, media cache and connectivity monitor wired together
pub struct BeatClient {
    session: SessionManager,
    cache: MediaCache,
    uploads: UploadCoordinator,
    catalog: Arc<dyn MediaCatalog>,
    subscription: SessionSubscription,
    monitor: MonitorHandle,
    sign_out_watch: JoinHandle<()>,
}

impl BeatClient {
    /// Build every component and start following identity and connectivity.
    /// Must be called from within a Tokio runtime.
    pub fn start(backends: Backends, config: ClientConfig) -> Self {
        let session = SessionManager::new(backends.documents.clone(), config.session);
        let cache = MediaCache::from_config(backends.fetcher.clone(), &config.blob);
        let uploads = UploadCoordinator::from_arc(backends.objects.clone(), config.blob)
            .with_counter(Arc::new(session.clone()))
            .with_catalog(backends.catalog.clone())
            .with_cache(cache.clone());

        let subscription = session.start(backends.identity.as_ref());
        let monitor = NetworkMonitor::new(backends.connectivity.clone(), session.clone(), config.monitor)
            .with_cache(cache.clone())
            .start();
        let sign_out_watch = spawn_sign_out_watch(&session, &cache);

        info!("Beat client started");
        Self {
            session,
            cache,
            uploads,
            catalog: backends.catalog,
            subscription,
            monitor,
            sign_out_watch,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Debounced host connectivity
    pub fn connectivity(&self) -> Connectivity {
        let state = self.monitor.state();
        let current = *state.borrow();
        current
    }

    /// True when either the host or the session has seen the network go away
    pub fn is_offline(&self) -> bool {
        !self.connectivity().is_online() || self.session.snapshot().is_offline()
    }

    /// Upload on behalf of the signed-in user
    pub fn upload(&self, source: UploadSource, metadata: MediaMetadata) -> UploadResult<UploadTask> {
        let owner = self
            .session
            .snapshot()
            .uid()
            .map(str::to_string)
            .ok_or_else(|| UploadError::validation("You must be logged in to upload media"))?;
        self.uploads.submit(&owner, source, metadata)
    }

    /// Catalog records of the signed-in user's uploads
    pub async fn my_media(&self) -> StoreResult<Vec<(MediaRecordId, MediaRecord)>> {
        let owner = self.session.snapshot().uid().map(str::to_string);
        match owner {
            Some(owner) => self.catalog.list_for_owner(&owner).await,
            None => Ok(Vec::new()),
        }
    }

    /// Stop background tasks and revoke every media handle
    pub async fn shutdown(self) -> MonitorResult<()> {
        self.subscription.stop();
        self.sign_out_watch.abort();
        self.cache.clear();
        let result = self.monitor.shutdown().await;
        if let Err(error) = &result {
            warn!(%error, "Network monitor did not stop cleanly");
        }
        info!("Beat client stopped");
        result
    }
}

/// Local media belongs to the signed-in user; drop it all on sign-out
fn spawn_sign_out_watch(session: &SessionManager, cache: &MediaCache) -> JoinHandle<()> {
    let mut snapshots = session.subscribe();
    let cache = cache.clone();
    tokio::spawn(async move {
        let mut signed_in = snapshots.borrow_and_update().identity.is_some();
        while snapshots.changed().await.is_ok() {
            let now_signed_in = snapshots.borrow_and_update().identity.is_some();
            if signed_in && !now_signed_in {
                cache.clear();
            }
            signed_in = now_signed_in;
        }
    })
}
