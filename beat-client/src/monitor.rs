use std::sync::Arc;

use beat_blob::MediaCache;
use beat_core::{Connectivity, ConnectivitySource};
use beat_session::SessionManager;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::{MonitorConfig, MonitorError, MonitorResult};

/// Handle for a running monitor
pub struct MonitorHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<MonitorResult<()>>,
    state: watch::Receiver<Connectivity>,
}

impl MonitorHandle {
    /// Stable connectivity as last acted on
    pub fn state(&self) -> watch::Receiver<Connectivity> {
        self.state.clone()
    }

    /// Gracefully shutdown the monitor
    pub async fn shutdown(self) -> MonitorResult<()> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| MonitorError::Join(e.to_string()))?
    }
}

/// Turns raw host connectivity events into debounced session and cache actions.
///
/// Going online re-arms the session and revalidates degraded media. Going
/// offline only records the fact; nothing is torn down.
#[derive(Clone)]
pub struct NetworkMonitor {
    source: Arc<dyn ConnectivitySource>,
    session: SessionManager,
    cache: Option<MediaCache>,
    config: MonitorConfig,
    state: Arc<watch::Sender<Connectivity>>,
}

impl NetworkMonitor {
    pub fn new(source: Arc<dyn ConnectivitySource>, session: SessionManager, config: MonitorConfig) -> Self {
        let (state, _) = watch::channel(Connectivity::Online);
        Self {
            source,
            session,
            cache: None,
            config,
            state: Arc::new(state),
        }
    }

    /// Revalidate this cache whenever connectivity returns
    pub fn with_cache(mut self, cache: MediaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Stable state assumed before the first event
    pub fn with_initial(self, connectivity: Connectivity) -> Self {
        self.state.send_replace(connectivity);
        self
    }

    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Start listening on a background task
    pub fn start(&self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let events = self.source.subscribe();
        let monitor = self.clone();
        let join_handle = tokio::spawn(async move { monitor.run(events, shutdown_rx).await });

        info!(debounce_ms = self.config.debounce.as_millis() as u64, "Started network monitor");

        MonitorHandle {
            shutdown_tx,
            join_handle,
            state: self.subscribe(),
        }
    }

    async fn run(
        self,
        mut events: BoxStream<'static, Connectivity>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> MonitorResult<()> {
        let mut pending: Option<Connectivity> = None;
        let quiet = tokio::time::sleep(self.config.debounce);
        tokio::pin!(quiet);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Network monitor shutting down");
                    break;
                }
                event = events.next() => match event {
                    Some(connectivity) => {
                        debug!(%connectivity, "Connectivity event");
                        pending = Some(connectivity);
                        quiet.as_mut().reset(Instant::now() + self.config.debounce);
                    }
                    None => {
                        if let Some(connectivity) = pending.take() {
                            self.apply(connectivity).await;
                        }
                        debug!("Connectivity source closed");
                        break;
                    }
                },
                _ = &mut quiet, if pending.is_some() => {
                    if let Some(connectivity) = pending.take() {
                        self.apply(connectivity).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// Act on a transition that survived the debounce window
    #[instrument(skip(self))]
    async fn apply(&self, connectivity: Connectivity) {
        let changed = self.state.send_if_modified(|state| {
            if *state == connectivity {
                return false;
            }
            *state = connectivity;
            true
        });
        if !changed {
            debug!("Already in this state, ignoring");
            return;
        }

        info!("Connectivity changed");
        self.session.set_connectivity(connectivity);
        if !connectivity.is_online() {
            return;
        }

        self.session.reconnect().await;
        if let Some(cache) = self.cache.clone() {
            tokio::spawn(async move {
                cache.revalidate_degraded().await;
            });
        }
    }
}
