// src/backends/source.rs
//! Valve master server listing and A2S_INFO probes.

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, warn};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use super::{exchange, millis, read_cstr, resolve_masters, Backend};
use crate::error::QueryError;
use crate::models::game::{BackendKind, GameInfo, Settings};
use crate::models::server::ProbeReply;

const MASTER_RESPONSE: &[u8] = b"\xff\xff\xff\xff\x66\x0a";
const A2S_INFO: &[u8] = b"\xff\xff\xff\xffTSource Engine Query\0";
const REGION_WORLD: u8 = 0xFF;
const DEFAULT_MAX_PAGES: i64 = 8;

const S2C_CHALLENGE: u8 = 0x41;
const S2A_INFO: u8 = 0x49;

pub struct SourceBackend {
    master_timeout: Duration,
}

impl SourceBackend {
    pub fn new(master_timeout: Duration) -> Self {
        Self { master_timeout }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct MasterPage {
    pub servers: Vec<SocketAddr>,
    /// Last entry of the page, used as the seed of the next request.
    pub last: Option<SocketAddr>,
    pub complete: bool,
}

pub fn master_request(seed: SocketAddr, filter: &str) -> Vec<u8> {
    let mut packet = vec![0x31, REGION_WORLD];
    packet.extend_from_slice(seed.to_string().as_bytes());
    packet.push(0);
    packet.extend_from_slice(filter.as_bytes());
    packet.push(0);
    packet
}

/// Parses one master reply. The `0.0.0.0:0` entry ends the listing.
pub fn parse_master_response(data: &[u8]) -> Result<MasterPage, String> {
    let body = data
        .strip_prefix(MASTER_RESPONSE)
        .ok_or_else(|| "unexpected master response header".to_string())?;
    if body.len() % 6 != 0 {
        return Err(format!("server list length {} is not a multiple of 6", body.len()));
    }

    let mut page = MasterPage::default();
    for entry in body.chunks_exact(6) {
        let ip = Ipv4Addr::new(entry[0], entry[1], entry[2], entry[3]);
        let port = BigEndian::read_u16(&entry[4..6]);
        if ip.is_unspecified() && port == 0 {
            page.complete = true;
            break;
        }
        let addr = SocketAddr::from((ip, port));
        page.last = Some(addr);
        page.servers.push(addr);
    }
    Ok(page)
}

/// Pages through one master. `budget` covers the whole listing, not each page.
async fn list_master(
    master: SocketAddr,
    filter: String,
    max_pages: usize,
    budget: Duration,
) -> Result<Vec<SocketAddr>, String> {
    let deadline = Instant::now() + budget;
    let mut servers = Vec::new();
    let mut seed = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));

    for page_no in 0..max_pages {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Master {} ran out of time after {} pages", master, page_no);
            break;
        }
        let request = master_request(seed, &filter);
        let page = match exchange(master, &request, remaining).await {
            Ok((reply, _)) => parse_master_response(&reply),
            Err(e) => Err(e.to_string()),
        };
        let page = match page {
            Ok(page) => page,
            Err(e) if page_no == 0 => return Err(e),
            Err(e) => {
                debug!("Master {} stopped paging after {} pages: {}", master, page_no, e);
                break;
            }
        };
        servers.extend(page.servers);
        match page.last {
            Some(last) if !page.complete => seed = last,
            _ => break,
        }
    }

    Ok(servers)
}

fn challenge_request(challenge: &[u8]) -> Vec<u8> {
    let mut packet = A2S_INFO.to_vec();
    packet.extend_from_slice(challenge);
    packet
}

/// Returns the challenge bytes when `data` is an S2C_CHALLENGE reply.
pub fn parse_challenge(data: &[u8]) -> Option<[u8; 4]> {
    match data {
        [0xFF, 0xFF, 0xFF, 0xFF, S2C_CHALLENGE, a, b, c, d, ..] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

pub fn parse_info(data: &[u8]) -> Result<ProbeReply, String> {
    let body = data
        .strip_prefix(b"\xff\xff\xff\xff")
        .ok_or_else(|| "missing packet header".to_string())?;
    let (&kind, mut cursor) = body
        .split_first()
        .ok_or_else(|| "empty reply".to_string())?;
    if kind != S2A_INFO {
        return Err(format!("unexpected reply type {:#04x}", kind));
    }

    let truncated = |field: &str| format!("reply truncated at {}", field);
    let _protocol = cursor.read_u8().map_err(|_| truncated("protocol"))?;
    let name = read_cstr(&mut cursor).ok_or_else(|| truncated("name"))?;
    let map = read_cstr(&mut cursor).ok_or_else(|| truncated("map"))?;
    let folder = read_cstr(&mut cursor).ok_or_else(|| truncated("folder"))?;
    let game = read_cstr(&mut cursor).ok_or_else(|| truncated("game"))?;
    let _app_id = cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| truncated("app id"))?;

    let mut counters = [0u8; 7];
    std::io::Read::read_exact(&mut cursor, &mut counters).map_err(|_| truncated("player counters"))?;
    let [players, max_players, _bots, _server_type, _environment, visibility, _vac] = counters;

    Ok(ProbeReply {
        name,
        player_count: u32::from(players),
        player_limit: u32::from(max_players),
        password: visibility == 1,
        game_mod: folder,
        game_type: game,
        terrain: map,
        ping: None,
    })
}

#[async_trait]
impl Backend for SourceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Source
    }

    async fn discover(&self, game: &GameInfo, settings: &Settings) -> Result<Vec<SocketAddr>, QueryError> {
        let uris = settings
            .get("master_uri")
            .and_then(|v| v.as_list())
            .unwrap_or(&[]);
        if uris.is_empty() {
            return Err(QueryError::DiscoveryUnavailable(format!("{} has no master configured", game.id)));
        }
        let filter = settings
            .get("filter")
            .and_then(|v| v.as_text())
            .unwrap_or_default()
            .to_string();
        let max_pages = settings
            .get("max_pages")
            .and_then(|v| v.as_int())
            .unwrap_or(DEFAULT_MAX_PAGES)
            .max(1) as usize;

        let masters = resolve_masters(uris).await;
        if masters.is_empty() {
            return Err(QueryError::DiscoveryUnavailable("no master could be resolved".to_string()));
        }

        let mut listings = JoinSet::new();
        for master in masters {
            let filter = filter.clone();
            let timeout = self.master_timeout;
            listings.spawn(async move { (master, list_master(master, filter, max_pages, timeout).await) });
        }

        let mut answered = 0usize;
        let mut seen = HashSet::new();
        let mut servers = Vec::new();
        while let Some(joined) = listings.join_next().await {
            match joined {
                Ok((_, Ok(list))) => {
                    answered += 1;
                    servers.extend(list.into_iter().filter(|addr| seen.insert(*addr)));
                }
                Ok((master, Err(e))) => warn!("Master {} failed for {}: {}", master, game.id, e),
                Err(e) => warn!("Master listing task failed for {}: {}", game.id, e),
            }
        }

        if answered == 0 {
            return Err(QueryError::DiscoveryUnavailable(format!("no master answered for {}", game.id)));
        }
        Ok(servers)
    }

    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<ProbeReply, QueryError> {
        let deadline = Instant::now() + timeout;
        let (mut reply, mut rtt) = exchange(addr, A2S_INFO, timeout).await?;

        if let Some(challenge) = parse_challenge(&reply) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(QueryError::ProbeTimeout(addr));
            }
            (reply, rtt) = exchange(addr, &challenge_request(&challenge), remaining).await?;
        }

        let mut probe = parse_info(&reply).map_err(|reason| QueryError::malformed(addr, reason))?;
        probe.ping = Some(millis(rtt));
        Ok(probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_packet(name: &str, map: &str, players: u8, max: u8, visibility: u8) -> Vec<u8> {
        let mut packet = b"\xff\xff\xff\xff\x49\x11".to_vec();
        for s in [name, map, "tf", "Team Fortress"] {
            packet.extend_from_slice(s.as_bytes());
            packet.push(0);
        }
        packet.extend_from_slice(&440u16.to_le_bytes());
        packet.extend_from_slice(&[players, max, 0, b'd', b'l', visibility, 1]);
        packet
    }

    #[test]
    fn test_master_request_layout() {
        let seed: SocketAddr = "0.0.0.0:0".parse().unwrap();
        let packet = master_request(seed, "\\appid\\440");
        assert_eq!(packet, b"\x31\xff0.0.0.0:0\0\\appid\\440\0".to_vec());
    }

    #[test]
    fn test_parse_master_pages() {
        let mut data = MASTER_RESPONSE.to_vec();
        data.extend_from_slice(&[192, 0, 2, 7, 0x69, 0x87]);
        data.extend_from_slice(&[192, 0, 2, 8, 0x69, 0x88]);
        let page = parse_master_response(&data).unwrap();
        assert!(!page.complete);
        assert_eq!(page.servers.len(), 2);
        assert_eq!(page.last, Some("192.0.2.8:27016".parse().unwrap()));

        data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        let page = parse_master_response(&data).unwrap();
        assert!(page.complete);
        assert_eq!(page.servers.len(), 2);
    }

    #[test]
    fn test_parse_master_rejects_ragged_body() {
        let mut data = MASTER_RESPONSE.to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        assert!(parse_master_response(&data).is_err());
        assert!(parse_master_response(b"\xff\xff\xff\xff\x67").is_err());
    }

    #[test]
    fn test_parse_challenge() {
        assert_eq!(
            parse_challenge(b"\xff\xff\xff\xff\x41\x01\x02\x03\x04"),
            Some([1, 2, 3, 4])
        );
        assert_eq!(parse_challenge(b"\xff\xff\xff\xff\x49\x01"), None);
        assert_eq!(parse_challenge(b"\xff\xff\xff\xff\x41\x01"), None);
    }

    #[test]
    fn test_parse_info() {
        let reply = parse_info(&info_packet("2Fort 24/7", "ctf_2fort", 18, 24, 1)).unwrap();
        assert_eq!(reply.name, "2Fort 24/7");
        assert_eq!(reply.terrain, "ctf_2fort");
        assert_eq!(reply.game_mod, "tf");
        assert_eq!(reply.game_type, "Team Fortress");
        assert_eq!(reply.player_count, 18);
        assert_eq!(reply.player_limit, 24);
        assert!(reply.password);
    }

    #[test]
    fn test_parse_info_rejects_truncated() {
        let packet = info_packet("x", "y", 1, 2, 0);
        assert!(parse_info(&packet[..packet.len() - 3]).is_err());
        assert!(parse_info(b"\xff\xff\xff\xff\x6d").is_err());
    }
}
