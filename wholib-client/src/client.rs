//! Live update client
//!
//! Owns the whole pipeline: transport selection, reconnection, batching,
//! optimistic mutations, and the item cache. One instance per view that
//! wants live enrichment status; `disconnect()` tears down every task and
//! timer the instance created, so navigating away leaks nothing.
//!
//! Data flow: transport -> raw `ServerEvent` -> batcher queue -> debounced
//! flush -> cache -> `UpdateBus` notification. Mutation flow: optimistic
//! cache patch -> network request -> rollback on failure, supersession by
//! the next server update on success.

use crate::api::LibraryApi;
use crate::batch::UpdateBatcher;
use crate::cache::ItemCache;
use crate::optimistic::OptimisticTracker;
use crate::reconnect::{ConnectionState, ReconnectDecision, ReconnectManager, ReconnectPolicy};
use crate::transport::{self, TransportKind};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wholib_common::config::ClientConfig;
use wholib_common::events::{CacheUpdate, ServerEvent, UpdateBus};
use wholib_common::types::EnrichmentStatus;
use wholib_common::Result;

struct RunningTasks {
    supervisor: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// Facade over the live-update core.
pub struct LiveUpdateClient {
    config: ClientConfig,
    http: reqwest::Client,
    api: LibraryApi,
    cache: Arc<ItemCache>,
    bus: UpdateBus,
    tracker: Arc<OptimisticTracker>,
    batcher: Arc<UpdateBatcher>,
    reconnect: Arc<Mutex<ReconnectManager>>,
    state_tx: watch::Sender<ConnectionState>,
    tasks: Mutex<Option<RunningTasks>>,
}

impl LiveUpdateClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::new();
        let api = LibraryApi::new(http.clone(), config.base_url.clone());
        let cache = Arc::new(ItemCache::new());
        let bus = UpdateBus::new(256);
        let tracker = Arc::new(OptimisticTracker::new(
            cache.clone(),
            bus.clone(),
            config.mutation_timeout,
        ));
        let batcher = Arc::new(UpdateBatcher::new(
            cache.clone(),
            tracker.clone(),
            bus.clone(),
            config.debounce,
        ));
        let reconnect = Arc::new(Mutex::new(ReconnectManager::new(ReconnectPolicy {
            base_delay: config.reconnect_base_delay,
            max_attempts: config.max_reconnect_attempts,
            polling_fallback: config.polling_fallback,
        })));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            config,
            http,
            api,
            cache,
            bus,
            tracker,
            batcher,
            reconnect,
            state_tx,
            tasks: Mutex::new(None),
        })
    }

    /// Shared item cache (read side for rendering).
    pub fn cache(&self) -> Arc<ItemCache> {
        self.cache.clone()
    }

    /// REST client for browsing, search, and preference CRUD.
    pub fn api(&self) -> &LibraryApi {
        &self.api
    }

    /// Bus of cache-change notifications for UI subscribers.
    pub fn updates(&self) -> UpdateBus {
        self.bus.clone()
    }

    /// Watch the connection state for indicator rendering.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Reconnect attempts since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.lock().expect("reconnect lock poisoned").attempts()
    }

    /// When a transport last came up, if ever.
    pub fn last_connected(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .last_connected()
    }

    /// Establish the live-update channel.
    ///
    /// Also the manual escape from the terminal `Error` state. Calling it
    /// while already connected is a no-op.
    pub fn connect(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().expect("task lock poisoned");
        if let Some(running) = tasks.as_ref() {
            if !running.supervisor.is_finished() {
                debug!("connect() ignored: already running");
                return;
            }
        }

        self.reconnect.lock().expect("reconnect lock poisoned").reset();

        let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(256);
        let consumer = tokio::spawn(Arc::clone(self).consume_events(event_rx));
        let supervisor = tokio::spawn(Arc::clone(self).supervise(event_tx));

        *tasks = Some(RunningTasks {
            supervisor,
            consumer,
        });
    }

    /// Tear down the transport, scheduled reconnects, and the pending
    /// flush timer. Idempotent.
    pub fn disconnect(&self) {
        let running = self.tasks.lock().expect("task lock poisoned").take();
        if let Some(running) = running {
            running.supervisor.abort();
            running.consumer.abort();
            info!("Live-update client disconnected");
        }
        // Drain already-received updates so none are lost.
        self.batcher.shutdown();
        self.reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .on_disconnect();
        let _ = self.state_tx.send(ConnectionState::Disconnected);
    }

    /// Request a priority re-scrape of one item, optimistically moving it
    /// back to `pending` in the cache before the server confirms.
    ///
    /// Rejects with `MutationInProgress` while an earlier mutation for the
    /// same item is unresolved; rolls back and reports on failure or
    /// timeout.
    pub async fn request_rescrape(&self, item_id: Uuid) -> Result<()> {
        self.tracker
            .request_mutation(
                item_id,
                |item| {
                    item.enrichment_status = EnrichmentStatus::Pending;
                    item.enrichment_error = None;
                },
                async {
                    self.api.enrich_item(item_id).await?;
                    Ok(())
                },
            )
            .await
    }

    /// Supervisor loop: establish a transport, pump it, and route failures
    /// through the reconnection state machine.
    async fn supervise(self: Arc<Self>, event_tx: mpsc::Sender<ServerEvent>) {
        loop {
            {
                let mut mgr = self.reconnect.lock().expect("reconnect lock poisoned");
                mgr.on_connecting();
            }
            let _ = self.state_tx.send(ConnectionState::Connecting);

            let outcome: Result<()> = match transport::establish(&self.http, &self.config).await {
                Ok(active) => {
                    let kind = active.kind();
                    {
                        let mut mgr = self.reconnect.lock().expect("reconnect lock poisoned");
                        mgr.on_connected();
                    }
                    let _ = self.state_tx.send(ConnectionState::Connected);

                    let result = active.run(event_tx.clone()).await;
                    match result {
                        // Receiver dropped: orderly shutdown.
                        Ok(()) => return,
                        Err(e) => {
                            warn!("{} transport failed: {}", kind, e);
                            Err(e)
                        }
                    }
                }
                Err(e) => {
                    debug!("No transport could be established: {}", e);
                    Err(e)
                }
            };
            debug_assert!(outcome.is_err());

            let decision = {
                let mut mgr = self.reconnect.lock().expect("reconnect lock poisoned");
                mgr.on_failure()
            };
            match decision {
                ReconnectDecision::RetryAfter(delay) => {
                    let _ = self.state_tx.send(ConnectionState::Reconnecting);
                    tokio::time::sleep(delay).await;
                }
                ReconnectDecision::FallbackToPolling => {
                    let _ = self.state_tx.send(ConnectionState::Connected);
                    info!("Switched permanently to {} transport", TransportKind::Polling);
                    let poller = transport::polling_transport(&self.http, &self.config);
                    // Polling never escalates; it runs until shutdown.
                    let _ = poller.run(event_tx.clone()).await;
                    return;
                }
                ReconnectDecision::GiveUp => {
                    let _ = self.state_tx.send(ConnectionState::Error);
                    warn!("Real-time updates unavailable until manual reconnect");
                    return;
                }
            }
        }
    }

    /// Consumer loop: route decoded events into the batcher and the bus.
    async fn consume_events(self: Arc<Self>, mut event_rx: mpsc::Receiver<ServerEvent>) {
        while let Some(event) = event_rx.recv().await {
            match event {
                ServerEvent::ItemsUpdated { items, stats } => {
                    // Items the user explicitly acted on skip the debounce
                    // window so their own action is reflected immediately.
                    let (priority, routine): (Vec<_>, Vec<_>) = items
                        .into_iter()
                        .partition(|item| self.tracker.has_pending(&item.id));
                    if !priority.is_empty() {
                        self.batcher.enqueue_priority(priority);
                    }
                    self.batcher.enqueue(routine, stats);
                }
                ServerEvent::Heartbeat => {
                    debug!("Live-update heartbeat");
                }
                ServerEvent::Error { message } => {
                    // Non-fatal notice; connection stays up.
                    warn!("Server-sent error: {}", message);
                    self.bus.emit_lossy(CacheUpdate::ServerNotice { message });
                }
            }
        }
        debug!("Event consumer stopped");
    }
}

impl Drop for LiveUpdateClient {
    fn drop(&mut self) {
        if let Some(running) = self.tasks.lock().expect("task lock poisoned").take() {
            running.supervisor.abort();
            running.consumer.abort();
        }
    }
}
