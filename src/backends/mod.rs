// src/backends/mod.rs
pub mod quake3;
pub mod source;

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, UdpSocket};

use crate::error::QueryError;
use crate::models::game::{BackendKind, GameInfo, Settings};
use crate::models::server::ProbeReply;

/// One protocol family. Implementations keep no mutable state between calls,
/// so the engine may run any number of probes concurrently.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn discover(&self, game: &GameInfo, settings: &Settings) -> Result<Vec<SocketAddr>, QueryError>;

    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<ProbeReply, QueryError>;
}

#[derive(Clone, Default)]
pub struct BackendSet {
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The protocol families shipped with the crate.
    pub fn builtin(master_timeout: Duration) -> Self {
        Self::new()
            .with(Arc::new(quake3::Quake3Backend::new(master_timeout)))
            .with(Arc::new(source::SourceBackend::new(master_timeout)))
    }

    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn Backend>> {
        self.backends.get(&kind).cloned()
    }

    pub fn supports(&self, kind: BackendKind) -> bool {
        self.backends.contains_key(&kind)
    }
}

async fn bind_for(target: &SocketAddr) -> std::io::Result<UdpSocket> {
    if target.is_ipv4() {
        UdpSocket::bind("0.0.0.0:0").await
    } else {
        UdpSocket::bind("[::]:0").await
    }
}

/// Sends one datagram and waits for the first reply from `addr`.
/// Returns the reply and the measured round trip.
pub(crate) async fn exchange(
    addr: SocketAddr,
    packet: &[u8],
    timeout: Duration,
) -> Result<(Vec<u8>, Duration), QueryError> {
    let socket = bind_for(&addr)
        .await
        .map_err(|e| QueryError::malformed(addr, format!("could not bind udp socket: {}", e)))?;
    socket
        .connect(addr)
        .await
        .map_err(|e| QueryError::malformed(addr, format!("could not connect: {}", e)))?;

    let started = Instant::now();
    socket
        .send(packet)
        .await
        .map_err(|e| QueryError::malformed(addr, format!("send failed: {}", e)))?;

    let mut buffer = vec![0u8; 4096];
    match tokio::time::timeout(timeout, socket.recv(&mut buffer)).await {
        Ok(Ok(len)) => {
            buffer.truncate(len);
            Ok((buffer, started.elapsed()))
        }
        Ok(Err(e)) => Err(QueryError::malformed(addr, format!("receive failed: {}", e))),
        Err(_) => Err(QueryError::ProbeTimeout(addr)),
    }
}

/// Resolves `host:port` master entries, skipping the ones that do not resolve.
pub(crate) async fn resolve_masters(uris: &[String]) -> Vec<SocketAddr> {
    let mut masters = Vec::new();
    for uri in uris {
        match lookup_host(uri.as_str()).await {
            Ok(mut addrs) => {
                if let Some(addr) = addrs.next() {
                    masters.push(addr);
                }
            }
            Err(e) => log::warn!("Could not resolve master {}: {}", uri, e),
        }
    }
    masters
}

pub(crate) fn millis(elapsed: Duration) -> u32 {
    elapsed.as_millis().min(u32::MAX as u128) as u32
}

/// Reads a NUL-terminated string, advancing `data` past the terminator.
pub(crate) fn read_cstr(data: &mut &[u8]) -> Option<String> {
    let end = data.iter().position(|&b| b == 0)?;
    let s = String::from_utf8_lossy(&data[..end]).into_owned();
    *data = &data[end + 1..];
    Some(s)
}
