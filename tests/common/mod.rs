//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use srvscout::backends::{Backend, BackendSet};
use srvscout::geo::GeoResolver;
use srvscout::launcher::ProcessLauncher;
use srvscout::models::game::{OptionSpec, PresentationHint, SettingValue, Settings, SettingsSchema};
use srvscout::{BackendKind, GameInfo, GameTable, ProbeReply, QueryConfig, QueryEngine, QueryError};

#[derive(Clone)]
pub enum Outcome {
    Reply { name: &'static str, ping: Option<u32> },
    Hang,
    Malformed,
}

pub struct MockBackend {
    pub discovery: Option<Vec<SocketAddr>>,
    pub outcomes: HashMap<SocketAddr, Outcome>,
    pub discover_delay: Duration,
    pub probe_delay: Duration,
    pub discover_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    pub active_probes: AtomicUsize,
    pub max_active_probes: AtomicUsize,
}

impl MockBackend {
    pub fn new(outcomes: Vec<(SocketAddr, Outcome)>) -> Self {
        Self {
            discovery: Some(outcomes.iter().map(|(addr, _)| *addr).collect()),
            outcomes: outcomes.into_iter().collect(),
            discover_delay: Duration::ZERO,
            probe_delay: Duration::ZERO,
            discover_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            active_probes: AtomicUsize::new(0),
            max_active_probes: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            discovery: None,
            ..Self::new(Vec::new())
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Quake3
    }

    async fn discover(&self, _game: &GameInfo, _settings: &Settings) -> Result<Vec<SocketAddr>, QueryError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.discover_delay).await;
        self.discovery
            .clone()
            .ok_or_else(|| QueryError::DiscoveryUnavailable("master offline".to_string()))
    }

    async fn probe(&self, addr: SocketAddr, _timeout: Duration) -> Result<ProbeReply, QueryError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_probes.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.probe_delay).await;
        self.active_probes.fetch_sub(1, Ordering::SeqCst);

        match self.outcomes.get(&addr).cloned() {
            Some(Outcome::Reply { name, ping }) => Ok(ProbeReply {
                name: name.to_string(),
                player_count: 3,
                player_limit: 16,
                password: false,
                game_mod: "baseq3".to_string(),
                game_type: "FFA".to_string(),
                terrain: "q3dm17".to_string(),
                ping,
            }),
            Some(Outcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(QueryError::ProbeTimeout(addr))
            }
            Some(Outcome::Malformed) | None => Err(QueryError::malformed(addr, "garbage")),
        }
    }
}

#[derive(Default)]
pub struct RecordingLauncher {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub fail: bool,
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, program: &str, args: &[String]) -> std::io::Result<()> {
        self.calls.lock().push((program.to_string(), args.to_vec()));
        if self.fail {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such binary"))
        } else {
            Ok(())
        }
    }
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

pub fn mock_game(id: &str) -> GameInfo {
    let mut schema = SettingsSchema::new();
    schema.insert(
        "path".into(),
        OptionSpec::new(SettingValue::Text(String::new()), PresentationHint::PathChooser),
    );
    GameInfo {
        id: id.to_string(),
        name: format!("Mock {}", id),
        backend: BackendKind::Quake3,
        schema,
        launch: Some(srvscout::models::game::LaunchMapping {
            binary_option: "path".into(),
            default_binary: "mockgame".into(),
            connect_args: vec!["+connect".into(), "{host}".into()],
            password_args: vec!["+password".into(), "{password}".into()],
        }),
    }
}

pub fn test_config() -> QueryConfig {
    QueryConfig {
        probe_workers: 8,
        probe_timeout: Duration::from_millis(150),
        discovery_timeout: Duration::from_secs(2),
        probe_rate_per_sec: 10_000,
    }
}

pub fn geo() -> Arc<GeoResolver> {
    Arc::new(GeoResolver::from_ranges_text("192.0.2.0/24,NL\n198.51.100.0/24,DE\n"))
}

pub fn engine_with(
    games: Vec<GameInfo>,
    backend: Arc<MockBackend>,
    launcher: Arc<RecordingLauncher>,
    config: QueryConfig,
) -> Arc<QueryEngine> {
    let table = Arc::new(GameTable::new(games));
    QueryEngine::new(table, BackendSet::new().with(backend), geo(), launcher, config)
}
