// src/engine/query.rs
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::aggregator::aggregate;
use super::status::{StatusEvent, StatusTracker};
use crate::backends::{Backend, BackendSet};
use crate::error::{LaunchFailure, QueryError, SettingsError};
use crate::geo::GeoResolver;
use crate::launcher::{build_command, ProcessLauncher};
use crate::models::game::{QueryStatus, SettingValue};
use crate::models::server::{ProbeReply, ServerRecord};
use crate::storage::memory::{GameSlot, GameTable, TableSnapshot};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Called once per request with the game id and the post-cycle table.
pub type Completion = Box<dyn FnOnce(&str, TableSnapshot) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Upper bound on probes in flight for one cycle.
    pub probe_workers: usize,
    pub probe_timeout: Duration,
    pub discovery_timeout: Duration,
    /// Probes started per second across all cycles.
    pub probe_rate_per_sec: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            probe_workers: 64,
            probe_timeout: Duration::from_millis(1500),
            discovery_timeout: Duration::from_secs(5),
            probe_rate_per_sec: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRequest {
    Started(Uuid),
    /// A cycle for the game was already running; the callback rides on it.
    Coalesced,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeStats {
    pub discovered: usize,
    pub succeeded: usize,
    pub timed_out: usize,
    pub malformed: usize,
}

pub struct QueryEngine {
    table: Arc<GameTable>,
    tracker: Arc<StatusTracker>,
    backends: BackendSet,
    geo: Arc<GeoResolver>,
    launcher: Arc<dyn ProcessLauncher>,
    config: QueryConfig,
    /// Callbacks waiting on the running cycle, keyed by game id. Presence
    /// of a key is the in-flight marker.
    in_flight: Mutex<HashMap<String, Vec<Completion>>>,
    probe_limiter: Arc<DirectLimiter>,
}

impl QueryEngine {
    pub fn new(
        table: Arc<GameTable>,
        backends: BackendSet,
        geo: Arc<GeoResolver>,
        launcher: Arc<dyn ProcessLauncher>,
        config: QueryConfig,
    ) -> Arc<Self> {
        let rate = NonZeroU32::new(config.probe_rate_per_sec).unwrap_or(NonZeroU32::MIN);
        let tracker = Arc::new(StatusTracker::new(table.game_ids()));

        Arc::new(Self {
            table,
            tracker,
            backends,
            geo,
            launcher,
            probe_limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            config,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn game_table(&self) -> TableSnapshot {
        self.table.snapshot()
    }

    pub fn table(&self) -> &Arc<GameTable> {
        &self.table
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn status(&self, game_id: &str) -> Option<QueryStatus> {
        self.tracker.status(game_id)
    }

    pub fn set_setting(&self, game_id: &str, option: &str, value: SettingValue) -> Result<(), SettingsError> {
        self.table.set_setting(game_id, option, value)
    }

    /// Starts a discovery and probe cycle for `game_id`, or joins the one
    /// already running. `on_complete` fires exactly once, from the cycle's
    /// task, after the final status is published.
    ///
    /// Must be called from within a tokio runtime.
    pub fn update_server_list<F>(self: &Arc<Self>, game_id: &str, on_complete: F) -> Result<UpdateRequest, QueryError>
    where
        F: FnOnce(&str, TableSnapshot) + Send + 'static,
    {
        let slot = self
            .table
            .get(game_id)
            .ok_or_else(|| QueryError::UnknownGame(game_id.to_string()))?;
        let backend = self
            .backends
            .get(slot.info.backend)
            .ok_or_else(|| QueryError::UnsupportedBackend {
                game: game_id.to_string(),
                kind: slot.info.backend,
            })?;

        let event = {
            let mut in_flight = self.in_flight.lock();
            if let Some(waiting) = in_flight.get_mut(game_id) {
                waiting.push(Box::new(on_complete));
                debug!("Coalesced update request for {}", game_id);
                return Ok(UpdateRequest::Coalesced);
            }
            let event = self.tracker.transition(game_id, QueryStatus::Working, || {
                self.table.set_status(game_id, QueryStatus::Working);
            })?;
            in_flight.insert(game_id.to_string(), vec![Box::new(on_complete) as Completion]);
            event
        };
        self.tracker.notify(&event);

        let cycle_id = Uuid::new_v4();
        let engine = Arc::clone(self);
        let game_id = game_id.to_string();
        tokio::spawn(async move {
            engine.run_cycle(cycle_id, game_id, backend).await;
        });

        Ok(UpdateRequest::Started(cycle_id))
    }

    /// Future form of [`QueryEngine::update_server_list`].
    pub async fn refresh(self: &Arc<Self>, game_id: &str) -> Result<TableSnapshot, QueryError> {
        let (tx, rx) = oneshot::channel();
        self.update_server_list(game_id, move |_, snapshot| {
            let _ = tx.send(snapshot);
        })?;
        rx.await
            .map_err(|_| QueryError::CycleAborted(game_id.to_string()))
    }

    pub fn start_game(&self, game_id: &str, host: &str, password: &str) -> Result<(), LaunchFailure> {
        let slot = self
            .table
            .get(game_id)
            .ok_or_else(|| LaunchFailure::UnknownGame(game_id.to_string()))?;
        let (program, args) = build_command(&slot.info, &slot.settings, host, password)?;

        info!("Launching {} for {}", program, game_id);
        self.launcher
            .launch(&program, &args)
            .map_err(|source| LaunchFailure::Spawn { program, source })
    }

    async fn run_cycle(self: Arc<Self>, cycle_id: Uuid, game_id: String, backend: Arc<dyn Backend>) {
        let started = Instant::now();
        let outcome = match self.table.get(&game_id) {
            Some(slot) => {
                // Backend panics end the cycle in Error.
                let engine = Arc::clone(&self);
                let collecting = tokio::spawn(async move { engine.collect(cycle_id, &slot, backend).await });
                collecting.await.unwrap_or_else(|e| {
                    error!("[{}] collection task for {} failed: {}", cycle_id, game_id, e);
                    Err(QueryError::CycleAborted(game_id.clone()))
                })
            }
            None => Err(QueryError::UnknownGame(game_id.clone())),
        };

        let (servers, status) = match outcome {
            Ok(servers) => {
                info!(
                    "[{}] {} ready with {} servers in {:?}",
                    cycle_id,
                    game_id,
                    servers.len(),
                    started.elapsed()
                );
                (servers, QueryStatus::Ready)
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", cycle_id, game_id, e);
                (Vec::new(), QueryStatus::Error)
            }
        };

        let (event, waiters, snapshot) = self.finish(&game_id, Arc::new(servers), status);
        if let Some(event) = event {
            self.tracker.notify(&event);
        }
        for on_complete in waiters {
            on_complete(&game_id, snapshot.clone());
        }
    }

    /// Publishes the cycle's outcome and takes the queued callbacks, holding
    /// the in-flight marker so no new cycle can start in between.
    fn finish(
        &self,
        game_id: &str,
        servers: Arc<Vec<ServerRecord>>,
        status: QueryStatus,
    ) -> (Option<StatusEvent>, Vec<Completion>, TableSnapshot) {
        let mut in_flight = self.in_flight.lock();
        match in_flight.remove(game_id) {
            Some(waiters) => {
                let event = self
                    .tracker
                    .transition(game_id, status, || {
                        self.table.complete_cycle(game_id, servers, status);
                    })
                    .map_err(|e| error!("Could not finish cycle for {}: {}", game_id, e))
                    .ok();
                (event, waiters, self.table.snapshot())
            }
            None => {
                error!("Cycle for {} finished without an in-flight marker", game_id);
                (None, Vec::new(), self.table.snapshot())
            }
        }
    }

    async fn collect(
        &self,
        cycle_id: Uuid,
        slot: &GameSlot,
        backend: Arc<dyn Backend>,
    ) -> Result<Vec<ServerRecord>, QueryError> {
        let game_id = slot.info.id.as_str();
        let discovery = tokio::time::timeout(
            self.config.discovery_timeout,
            backend.discover(&slot.info, &slot.settings),
        )
        .await
        .unwrap_or_else(|_| {
            Err(QueryError::DiscoveryUnavailable(format!(
                "discovery timed out after {:?}",
                self.config.discovery_timeout
            )))
        });
        let addrs = discovery?;
        debug!("[{}] {} discovered {} addresses", cycle_id, game_id, addrs.len());

        let (records, stats) = self.probe_all(game_id, backend, addrs).await;
        info!(
            "[{}] {} probes: {} discovered, {} answered, {} timed out, {} malformed",
            cycle_id, game_id, stats.discovered, stats.succeeded, stats.timed_out, stats.malformed
        );

        if records.is_empty() {
            return Err(QueryError::NoServersFound(game_id.to_string()));
        }
        Ok(aggregate(records))
    }

    async fn probe_all(
        &self,
        game_id: &str,
        backend: Arc<dyn Backend>,
        addrs: Vec<SocketAddr>,
    ) -> (Vec<ServerRecord>, ProbeStats) {
        let mut stats = ProbeStats {
            discovered: addrs.len(),
            ..ProbeStats::default()
        };
        let workers = Arc::new(Semaphore::new(self.config.probe_workers.max(1)));
        let mut probes = JoinSet::new();

        for addr in addrs {
            let permit = match Arc::clone(&workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let backend = Arc::clone(&backend);
            let limiter = Arc::clone(&self.probe_limiter);
            let timeout = self.config.probe_timeout;

            probes.spawn(async move {
                let _permit = permit;
                limiter.until_ready().await;
                let outcome = tokio::time::timeout(timeout, backend.probe(addr, timeout))
                    .await
                    .unwrap_or(Err(QueryError::ProbeTimeout(addr)));
                (addr, outcome)
            });
        }

        let mut records = Vec::with_capacity(stats.discovered);
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((addr, Ok(reply))) => {
                    stats.succeeded += 1;
                    records.push(self.annotate(game_id, addr, reply));
                }
                Ok((addr, Err(QueryError::ProbeTimeout(_)))) => {
                    stats.timed_out += 1;
                    debug!("Probe of {} timed out", addr);
                }
                Ok((addr, Err(e))) => {
                    stats.malformed += 1;
                    debug!("Probe of {} failed: {}", addr, e);
                }
                Err(e) => {
                    stats.malformed += 1;
                    warn!("Probe task failed: {}", e);
                }
            }
        }

        (records, stats)
    }

    fn annotate(&self, game_id: &str, addr: SocketAddr, reply: ProbeReply) -> ServerRecord {
        let country = self.geo.resolve(addr.ip());
        ServerRecord::from_probe(game_id, addr, reply, country)
    }
}
