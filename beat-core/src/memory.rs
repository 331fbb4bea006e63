//! In-memory backends for testing and development.
//!
//! Each backend is cheaply cloneable (shared state behind `Arc`), so a test can
//! hand one clone to the component under test and keep another to inject
//! failures and inspect what happened.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::{
    Connectivity, ConnectivitySource, CounterField, DocumentStore, Identity, IdentitySource,
    MediaCatalog, MediaRecord, MediaRecordId, ProfileDocument, StoreError, StoreResult,
};

/// Identity provider driven by the test or demo
#[derive(Clone)]
pub struct MemoryIdentitySource {
    current: Arc<watch::Sender<Option<Identity>>>,
}

impl MemoryIdentitySource {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            current: Arc::new(tx),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.current.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.current.send_replace(None);
    }
}

impl Default for MemoryIdentitySource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for MemoryIdentitySource {
    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[derive(Default)]
struct Faults {
    get: VecDeque<StoreError>,
    create: VecDeque<StoreError>,
    increment: VecDeque<StoreError>,
}

/// Profile document store with scripted failures
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    docs: Arc<RwLock<HashMap<String, ProfileDocument>>>,
    faults: Arc<Mutex<Faults>>,
    offline: Arc<AtomicBool>,
    get_calls: Arc<AtomicUsize>,
    enable_network_calls: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly
    pub fn insert<S: Into<String>>(&self, id: S, doc: ProfileDocument) {
        self.docs.write().insert(id.into(), doc);
    }

    pub fn document(&self, id: &str) -> Option<ProfileDocument> {
        self.docs.read().get(id).cloned()
    }

    /// Queue an error for the next `get` call(s), consumed in order
    pub fn fail_next_get(&self, error: StoreError) {
        self.faults.lock().get.push_back(error);
    }

    pub fn fail_next_create(&self, error: StoreError) {
        self.faults.lock().create.push_back(error);
    }

    pub fn fail_next_increment(&self, error: StoreError) {
        self.faults.lock().increment.push_back(error);
    }

    /// While offline every operation reports `Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn enable_network_calls(&self) -> usize {
        self.enable_network_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("Failed to get document because the client is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> StoreResult<ProfileDocument> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.faults.lock().get.pop_front() {
            return Err(error);
        }
        self.check_online()?;
        self.docs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    async fn create(&self, id: &str, doc: ProfileDocument) -> StoreResult<ProfileDocument> {
        if let Some(error) = self.faults.lock().create.pop_front() {
            return Err(error);
        }
        self.check_online()?;
        self.docs.write().insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn increment(&self, id: &str, field: CounterField, delta: i64) -> StoreResult<()> {
        if let Some(error) = self.faults.lock().increment.pop_front() {
            return Err(error);
        }
        self.check_online()?;
        let mut docs = self.docs.write();
        let doc = docs.get_mut(id).ok_or_else(|| StoreError::not_found(id))?;
        doc.add_to_counter(field, delta);
        Ok(())
    }

    async fn enable_network(&self) -> StoreResult<()> {
        self.enable_network_calls.fetch_add(1, Ordering::SeqCst);
        debug!("Memory document store network enabled");
        Ok(())
    }
}

/// Media catalog kept in insertion order
#[derive(Clone, Default)]
pub struct MemoryMediaCatalog {
    records: Arc<RwLock<Vec<(MediaRecordId, MediaRecord)>>>,
    faults: Arc<Mutex<VecDeque<StoreError>>>,
}

impl MemoryMediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_add(&self, error: StoreError) {
        self.faults.lock().push_back(error);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MediaCatalog for MemoryMediaCatalog {
    async fn add(&self, record: MediaRecord) -> StoreResult<MediaRecordId> {
        if let Some(error) = self.faults.lock().pop_front() {
            return Err(error);
        }
        let id = MediaRecordId::new();
        self.records.write().push((id.clone(), record));
        Ok(id)
    }

    async fn list_for_owner(&self, owner: &str) -> StoreResult<Vec<(MediaRecordId, MediaRecord)>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|(_, record)| record.owner == owner)
            .cloned()
            .collect())
    }
}

/// Connectivity signal that the test or demo fires by hand
#[derive(Clone)]
pub struct MemoryConnectivity {
    events: broadcast::Sender<Connectivity>,
}

impl MemoryConnectivity {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { events }
    }

    /// Fire a host connectivity event; dropped when nobody listens
    pub fn emit(&self, connectivity: Connectivity) {
        let _ = self.events.send(connectivity);
    }
}

impl Default for MemoryConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivitySource for MemoryConnectivity {
    fn subscribe(&self) -> BoxStream<'static, Connectivity> {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}
