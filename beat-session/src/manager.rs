use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beat_core::{
    Connectivity, CounterError, CounterField, CounterWriter, DocumentStore, Identity,
    IdentitySource, Profile, ProfileDocument, StoreError, StoreResult,
};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{DegradeReason, ResolutionState, SessionConfig, SessionSnapshot};

/// Owns the identity to profile resolution for one client.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    config: SessionConfig,
    snapshot: watch::Sender<SessionSnapshot>,
    active: Mutex<Option<ActiveResolution>>,
    generation: AtomicU64,
}

/// The identity currently being (or last) resolved, and the token that stops
/// its retry loop
struct ActiveResolution {
    identity: Identity,
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    IdentityChanged,
    Reconnect,
}

/// Keeps the identity subscription alive; dropping it unsubscribes
pub struct SessionSubscription {
    task: JoinHandle<()>,
}

impl SessionSubscription {
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn DocumentStore>, config: SessionConfig) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                snapshot,
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Follow identity changes from `source`.
    ///
    /// The identity current at call time is applied before this returns.
    pub fn start<S>(&self, source: &S) -> SessionSubscription
    where
        S: IdentitySource + ?Sized,
    {
        let mut identities = source.subscribe();
        let initial = identities.borrow_and_update().clone();
        self.apply_identity(initial);

        let manager = self.clone();
        let task = tokio::spawn(async move {
            while identities.changed().await.is_ok() {
                let identity = identities.borrow_and_update().clone();
                manager.apply_identity(identity);
            }
            debug!("Identity source closed");
        });

        SessionSubscription { task }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.snapshot.borrow().loading()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.inner.snapshot.borrow().profile.clone()
    }

    /// Wait until no resolution cycle is running
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.inner.snapshot.subscribe();
        let snapshot = match rx.wait_for(|s| !s.loading()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Wait until a signed-in session reaches `Ready` or `Degraded`.
    ///
    /// Pending while nobody is signed in.
    pub async fn wait_until_resolved(&self) -> SessionSnapshot {
        let mut rx = self.inner.snapshot.subscribe();
        let snapshot = match rx.wait_for(|s| s.identity.is_some() && s.state.is_terminal()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Record host connectivity; existing session data stays untouched
    pub fn set_connectivity(&self, connectivity: Connectivity) {
        let changed = self.inner.snapshot.send_if_modified(|s| {
            if s.connectivity == connectivity {
                return false;
            }
            s.connectivity = connectivity;
            true
        });
        if changed {
            info!(%connectivity, "Session connectivity changed");
        }
    }

    /// Re-arm the document store transport and, if the session still lacks a
    /// resolved profile, resolve again after the settle delay.
    ///
    /// Redundant calls are harmless: each re-trigger supersedes the previous one.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) {
        if let Err(error) = self.inner.store.enable_network().await {
            warn!(%error, "Error reconnecting document store");
        }

        let resumed = self.begin_resolution_if(Trigger::Reconnect, |active, snapshot| {
            active
                .filter(|_| needs_resolution(&snapshot.state))
                .map(|a| a.identity.clone())
        });
        if let Some(identity) = resumed {
            info!(uid = %identity.uid, "Re-triggered profile resolution after reconnect");
        }
    }

    /// Add `delta` to a counter of the signed-in profile.
    ///
    /// A missing document is created with the counter already applied. Errors
    /// are returned to the caller and leave the session state as it was.
    #[instrument(skip(self))]
    pub async fn write_counter(&self, field: CounterField, delta: i64) -> Result<(), CounterError> {
        let identity = self
            .inner
            .active
            .lock()
            .as_ref()
            .map(|a| a.identity.clone())
            .ok_or(CounterError::NoSession)?;

        match self.inner.store.increment(&identity.uid, field, delta).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => {
                debug!("Profile document missing, creating it with the counter applied");
                let mut profile = Profile::default_for(&identity);
                profile.add_to_counter(field, delta);
                self.inner
                    .store
                    .create(&identity.uid, profile.to_document())
                    .await?;
            }
            Err(error) => {
                warn!(%error, "Counter write failed");
                return Err(error.into());
            }
        }

        self.inner.snapshot.send_if_modified(|s| {
            let same_identity = s.identity.as_ref().map_or(false, |i| i.uid == identity.uid);
            match s.profile.as_mut() {
                Some(profile) if same_identity => {
                    profile.add_to_counter(field, delta);
                    true
                }
                _ => false,
            }
        });
        Ok(())
    }

    /// Persist a profile document for a newly registered account
    pub async fn create_profile(&self, uid: &str, mut doc: ProfileDocument) -> StoreResult<ProfileDocument> {
        doc.created_at.get_or_insert_with(Utc::now);
        info!(uid, "Creating profile document");

        let created = self.inner.store.create(uid, doc).await;
        if let Err(error) = &created {
            if self.snapshot().is_offline() {
                warn!(uid, %error, "Profile document not created while offline");
            } else {
                error!(uid, %error, "Profile document creation failed");
            }
        }
        created
    }

    fn apply_identity(&self, identity: Option<Identity>) {
        match identity {
            None => self.sign_out(),
            Some(identity) => {
                let unchanged = self
                    .inner
                    .active
                    .lock()
                    .as_ref()
                    .map_or(false, |a| a.identity == identity);
                if unchanged {
                    debug!(uid = %identity.uid, "Identity unchanged");
                    return;
                }
                info!(uid = %identity.uid, "Identity changed, resolving profile");
                self.begin_resolution(identity, Trigger::IdentityChanged);
            }
        }
    }

    fn sign_out(&self) {
        let mut active = self.inner.active.lock();
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            info!(uid = %previous.identity.uid, "Signed out, session cleared");
        }
        self.inner
            .snapshot
            .send_modify(|s| *s = SessionSnapshot::signed_out(s.connectivity));
    }

    fn begin_resolution(&self, identity: Identity, trigger: Trigger) {
        self.begin_resolution_if(trigger, |_, _| Some(identity));
    }

    /// Start resolving whichever identity `select` picks from the current
    /// state. Selection and install happen under one `active` lock, so a
    /// sign-out in between cannot be overwritten.
    fn begin_resolution_if<F>(&self, trigger: Trigger, select: F) -> Option<Identity>
    where
        F: FnOnce(Option<&ActiveResolution>, &SessionSnapshot) -> Option<Identity>,
    {
        let cancel = CancellationToken::new();
        let (identity, generation) = {
            let mut active = self.inner.active.lock();
            let identity = {
                let snapshot = self.inner.snapshot.borrow();
                select(active.as_ref(), &snapshot)
            }?;

            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(previous) = active.take() {
                previous.cancel.cancel();
                debug!(generation = previous.generation, "Superseded in-flight resolution");
            }
            *active = Some(ActiveResolution {
                identity: identity.clone(),
                generation,
                cancel: cancel.clone(),
            });

            if trigger == Trigger::IdentityChanged {
                let identity = identity.clone();
                self.inner.snapshot.send_modify(|s| {
                    s.identity = Some(identity);
                    s.profile = None;
                    s.state = ResolutionState::Authenticating;
                    s.retry_count = 0;
                });
            }
            (identity, generation)
        };

        let manager = self.clone();
        let resolving = identity.clone();
        tokio::spawn(async move {
            manager.resolve(resolving, generation, cancel, trigger).await;
        });
        Some(identity)
    }

    /// Apply `update` only if `generation` is still the live resolution
    fn publish<F>(&self, generation: u64, update: F) -> bool
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        let active = self.inner.active.lock();
        match active.as_ref() {
            Some(a) if a.generation == generation && !a.cancel.is_cancelled() => {
                self.inner.snapshot.send_modify(update);
                true
            }
            _ => false,
        }
    }

    #[instrument(skip(self, identity, cancel), fields(uid = %identity.uid))]
    async fn resolve(&self, identity: Identity, generation: u64, cancel: CancellationToken, trigger: Trigger) {
        if trigger == Trigger::Reconnect && !pause(self.inner.config.reconnect_settle, &cancel).await {
            return;
        }

        let started = self.publish(generation, |s| {
            s.state = ResolutionState::FetchingProfile;
            s.retry_count = 0;
        });
        if !started {
            return;
        }

        let max_attempts = self.inner.config.max_attempts;
        let mut retry_count = 0;

        loop {
            debug!(attempt = retry_count + 1, "Fetching profile");
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                fetched = self.inner.store.get(&identity.uid) => fetched,
            };

            match fetched {
                Ok(doc) => {
                    let profile = Profile::from_document(&identity, &doc);
                    let applied = self.publish(generation, |s| {
                        s.profile = Some(profile);
                        s.retry_count = retry_count;
                        s.state = ResolutionState::Ready;
                    });
                    if applied {
                        info!(retries = retry_count, "Profile resolved");
                    }
                    return;
                }
                Err(StoreError::NotFound { .. }) => {
                    self.create_default(&identity, generation, &cancel, retry_count).await;
                    return;
                }
                Err(error) if error.is_transient() => {
                    retry_count += 1;
                    if retry_count >= max_attempts {
                        warn!(retries = retry_count, %error, "Profile fetch retries exhausted, continuing degraded");
                        self.degrade(&identity, generation, retry_count, DegradeReason::RetriesExhausted);
                        return;
                    }

                    warn!(retry = retry_count, max = max_attempts, %error, "Profile fetch failed while offline, will retry");
                    let waiting = self.publish(generation, |s| {
                        s.state = ResolutionState::Retrying;
                        s.retry_count = retry_count;
                        s.connectivity = Connectivity::Offline;
                    });
                    if !waiting {
                        return;
                    }

                    let rearmed = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        rearmed = self.inner.store.enable_network() => rearmed,
                    };
                    if let Err(error) = rearmed {
                        warn!(%error, "Could not re-enable document store network");
                    }

                    if !pause(self.inner.config.retry_delay, &cancel).await {
                        return;
                    }
                    if !self.publish(generation, |s| s.state = ResolutionState::FetchingProfile) {
                        return;
                    }
                }
                Err(error) => {
                    error!(%error, "Profile fetch failed, continuing degraded");
                    self.degrade(&identity, generation, retry_count, DegradeReason::from_store_error(&error));
                    return;
                }
            }
        }
    }

    async fn create_default(&self, identity: &Identity, generation: u64, cancel: &CancellationToken, retry_count: u32) {
        if !self.publish(generation, |s| s.state = ResolutionState::Creating) {
            return;
        }

        info!("No profile document, creating default");
        let profile = Profile::default_for(identity);
        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            created = self.inner.store.create(&identity.uid, profile.to_document()) => created,
        };
        if let Err(error) = created {
            // The next resolution cycle finds no document and tries again.
            warn!(%error, "Could not persist default profile, continuing with in-memory copy");
        }

        self.publish(generation, |s| {
            s.profile = Some(profile);
            s.retry_count = retry_count;
            s.state = ResolutionState::Ready;
        });
    }

    fn degrade(&self, identity: &Identity, generation: u64, retry_count: u32, reason: DegradeReason) {
        let profile = Profile::default_for(identity);
        let offline = reason == DegradeReason::RetriesExhausted;
        self.publish(generation, |s| {
            s.profile = Some(profile);
            s.retry_count = retry_count;
            if offline {
                s.connectivity = Connectivity::Offline;
            }
            s.state = ResolutionState::Degraded(reason);
        });
    }
}

#[async_trait]
impl CounterWriter for SessionManager {
    async fn write_counter(&self, field: CounterField, delta: i64) -> Result<(), CounterError> {
        SessionManager::write_counter(self, field, delta).await
    }
}

/// Mid-resolution, or degraded only because the network was gone
fn needs_resolution(state: &ResolutionState) -> bool {
    state.is_resolving() || *state == ResolutionState::Degraded(DegradeReason::RetriesExhausted)
}

async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
