// src/backends/quake3.rs
//! Quake III Arena style masters (ioquake3, dpmaster) and `getstatus` probes.

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use super::{exchange, millis, resolve_masters, Backend};
use crate::error::QueryError;
use crate::models::game::{BackendKind, GameInfo, Settings};
use crate::models::server::ProbeReply;

const OOB: &[u8] = b"\xff\xff\xff\xff";
const GETSERVERS_RESPONSE: &[u8] = b"\xff\xff\xff\xffgetserversResponse";
const STATUS_RESPONSE: &[u8] = b"\xff\xff\xff\xffstatusResponse";

/// Window for follow-up master packets once the first one has arrived.
const FOLLOW_UP_WINDOW: Duration = Duration::from_millis(750);

pub struct Quake3Backend {
    master_timeout: Duration,
}

impl Quake3Backend {
    pub fn new(master_timeout: Duration) -> Self {
        Self { master_timeout }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct MasterPage {
    pub servers: Vec<SocketAddr>,
    pub complete: bool,
}

pub fn getservers_request(game_name: Option<&str>, protocol: i64) -> Vec<u8> {
    let mut packet = OOB.to_vec();
    match game_name {
        Some(name) => packet.extend_from_slice(format!("getservers {} {} empty full", name, protocol).as_bytes()),
        None => packet.extend_from_slice(format!("getservers {} empty full", protocol).as_bytes()),
    }
    packet
}

/// Parses one `getserversResponse` packet: `\` + 4 address bytes + 2 port
/// bytes per entry, optionally closed by `\EOT`.
pub fn parse_getservers_response(data: &[u8]) -> Result<MasterPage, String> {
    let mut rest = data
        .strip_prefix(GETSERVERS_RESPONSE)
        .ok_or_else(|| "unexpected master response header".to_string())?;
    let mut page = MasterPage::default();

    while !rest.is_empty() {
        if rest[0] != b'\\' {
            // Trailing padding after the last entry.
            if rest.iter().all(|&b| b == 0) {
                break;
            }
            return Err(format!("unexpected byte {:#04x} in server list", rest[0]));
        }
        rest = &rest[1..];
        if rest.starts_with(b"EOT") {
            page.complete = true;
            break;
        }
        if rest.len() < 6 {
            return Err(format!("truncated server entry ({} bytes)", rest.len()));
        }
        let ip = Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
        let port = BigEndian::read_u16(&rest[4..6]);
        rest = &rest[6..];

        if !ip.is_unspecified() && port != 0 {
            page.servers.push(SocketAddr::from((ip, port)));
        }
    }

    Ok(page)
}

async fn query_master(
    master: SocketAddr,
    request: Vec<u8>,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, String> {
    let socket = super::bind_for(&master).await.map_err(|e| e.to_string())?;
    socket.connect(master).await.map_err(|e| e.to_string())?;
    socket.send(&request).await.map_err(|e| e.to_string())?;

    let deadline = Instant::now() + timeout;
    let mut servers = Vec::new();
    let mut packets = 0usize;
    let mut buffer = vec![0u8; 65536];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let window = if packets == 0 {
            remaining
        } else {
            remaining.min(FOLLOW_UP_WINDOW)
        };
        match tokio::time::timeout(window, socket.recv(&mut buffer)).await {
            Ok(Ok(len)) => {
                let page = match parse_getservers_response(&buffer[..len]) {
                    Ok(page) => page,
                    Err(e) if packets == 0 => return Err(e),
                    Err(e) => {
                        warn!("Master {} sent a malformed follow-up packet: {}", master, e);
                        break;
                    }
                };
                packets += 1;
                servers.extend(page.servers);
                if page.complete {
                    break;
                }
            }
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) if packets == 0 => return Err("no response".to_string()),
            Err(_) => break,
        }
    }

    debug!("Master {} listed {} servers in {} packets", master, servers.len(), packets);
    Ok(servers)
}

pub fn getstatus_request(nonce: &str) -> Vec<u8> {
    let mut packet = OOB.to_vec();
    packet.extend_from_slice(format!("getstatus {}\n", nonce).as_bytes());
    packet
}

fn parse_infostring(line: &str) -> Result<HashMap<String, String>, String> {
    let body = line
        .strip_prefix('\\')
        .ok_or_else(|| "info string does not start with a backslash".to_string())?;
    let parts: Vec<&str> = body.split('\\').collect();
    if parts.len() % 2 != 0 {
        return Err("info string has a key without value".to_string());
    }
    Ok(parts
        .chunks(2)
        .map(|kv| (kv[0].to_ascii_lowercase(), kv[1].to_string()))
        .collect())
}

/// Removes `^N` colour escapes from a server name.
pub fn strip_colors(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '^' {
            if let Some(next) = chars.peek() {
                if next.is_ascii_alphanumeric() {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn gametype_label(raw: &str) -> String {
    match raw {
        "0" => "FFA",
        "1" => "Tournament",
        "2" => "Single Player",
        "3" => "TDM",
        "4" => "CTF",
        other => other,
    }
    .to_string()
}

/// Parses a `statusResponse`. When `nonce` is given and the server echoes a
/// `challenge` key, the two must match.
pub fn parse_status_response(data: &[u8], nonce: Option<&str>) -> Result<ProbeReply, String> {
    let body = data
        .strip_prefix(STATUS_RESPONSE)
        .ok_or_else(|| "unexpected status response header".to_string())?;
    let text = String::from_utf8_lossy(body);
    let mut lines = text.split('\n');

    // Remainder of the header line.
    lines.next();
    let info_line = lines
        .next()
        .ok_or_else(|| "missing info string".to_string())?;
    let info = parse_infostring(info_line.trim_end_matches('\r'))?;

    if let (Some(expected), Some(echoed)) = (nonce, info.get("challenge")) {
        if echoed != expected {
            return Err(format!("challenge mismatch: sent {}, got {}", expected, echoed));
        }
    }

    let player_count = lines.filter(|l| !l.trim().is_empty()).count() as u32;
    let field = |key: &str| info.get(key).cloned().unwrap_or_default();

    let name = info
        .get("sv_hostname")
        .or_else(|| info.get("hostname"))
        .map(|n| strip_colors(n))
        .unwrap_or_default();
    let game_mod = info
        .get("fs_game")
        .filter(|m| !m.is_empty())
        .or_else(|| info.get("gamename"))
        .cloned()
        .unwrap_or_default();

    Ok(ProbeReply {
        name,
        player_count,
        player_limit: field("sv_maxclients").trim().parse().unwrap_or(0),
        password: matches!(field("g_needpass").trim(), "1"),
        game_mod,
        game_type: info.get("g_gametype").map(|g| gametype_label(g)).unwrap_or_default(),
        terrain: field("mapname"),
        ping: None,
    })
}

#[async_trait]
impl Backend for Quake3Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Quake3
    }

    async fn discover(&self, game: &GameInfo, settings: &Settings) -> Result<Vec<SocketAddr>, QueryError> {
        let uris = settings
            .get("master_uri")
            .and_then(|v| v.as_list())
            .unwrap_or(&[]);
        if uris.is_empty() {
            return Err(QueryError::DiscoveryUnavailable(format!("{} has no master configured", game.id)));
        }
        let protocol = settings
            .get("protocol")
            .and_then(|v| v.as_int())
            .ok_or_else(|| QueryError::DiscoveryUnavailable(format!("{} has no protocol version", game.id)))?;
        let game_name = settings
            .get("master_game_name")
            .and_then(|v| v.as_text())
            .filter(|n| !n.is_empty());

        let masters = resolve_masters(uris).await;
        if masters.is_empty() {
            return Err(QueryError::DiscoveryUnavailable("no master could be resolved".to_string()));
        }

        let request = getservers_request(game_name, protocol);
        let mut queries = JoinSet::new();
        for master in masters {
            let request = request.clone();
            let timeout = self.master_timeout;
            queries.spawn(async move { (master, query_master(master, request, timeout).await) });
        }

        let mut answered = 0usize;
        let mut seen = HashSet::new();
        let mut servers = Vec::new();
        while let Some(joined) = queries.join_next().await {
            match joined {
                Ok((_, Ok(list))) => {
                    answered += 1;
                    servers.extend(list.into_iter().filter(|addr| seen.insert(*addr)));
                }
                Ok((master, Err(e))) => warn!("Master {} failed for {}: {}", master, game.id, e),
                Err(e) => warn!("Master query task failed for {}: {}", game.id, e),
            }
        }

        if answered == 0 {
            return Err(QueryError::DiscoveryUnavailable(format!("no master answered for {}", game.id)));
        }
        Ok(servers)
    }

    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<ProbeReply, QueryError> {
        let nonce = format!("{:08x}", rand::thread_rng().gen::<u32>());
        let (reply, rtt) = exchange(addr, &getstatus_request(&nonce), timeout).await?;

        let mut probe = parse_status_response(&reply, Some(&nonce))
            .map_err(|reason| QueryError::malformed(addr, reason))?;
        probe.ping = Some(millis(rtt));
        Ok(probe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master_packet(entries: &[([u8; 4], u16)], eot: bool) -> Vec<u8> {
        let mut packet = GETSERVERS_RESPONSE.to_vec();
        for (ip, port) in entries {
            packet.push(b'\\');
            packet.extend_from_slice(ip);
            packet.extend_from_slice(&port.to_be_bytes());
        }
        if eot {
            packet.extend_from_slice(b"\\EOT\0\0\0");
        }
        packet
    }

    #[test]
    fn test_getservers_request_formats() {
        assert_eq!(getservers_request(None, 68), b"\xff\xff\xff\xffgetservers 68 empty full".to_vec());
        assert_eq!(
            getservers_request(Some("Xonotic"), 3),
            b"\xff\xff\xff\xffgetservers Xonotic 3 empty full".to_vec()
        );
    }

    #[test]
    fn test_parse_master_page() {
        let packet = master_packet(&[([192, 0, 2, 1], 27960), ([0, 0, 0, 0], 0), ([198, 51, 100, 92], 27961)], true);
        let page = parse_getservers_response(&packet).unwrap();
        assert!(page.complete);
        assert_eq!(
            page.servers,
            vec![
                "192.0.2.1:27960".parse::<SocketAddr>().unwrap(),
                "198.51.100.92:27961".parse().unwrap()
            ]
        );
    }

    #[test]
    fn test_parse_master_page_without_eot() {
        let packet = master_packet(&[([192, 0, 2, 1], 27960)], false);
        let page = parse_getservers_response(&packet).unwrap();
        assert!(!page.complete);
        assert_eq!(page.servers.len(), 1);
    }

    #[test]
    fn test_parse_master_rejects_garbage() {
        assert!(parse_getservers_response(b"\xff\xff\xff\xffinfoResponse").is_err());

        let mut truncated = GETSERVERS_RESPONSE.to_vec();
        truncated.extend_from_slice(b"\\\x01\x02\x03");
        assert!(parse_getservers_response(&truncated).is_err());
    }

    #[test]
    fn test_strip_colors() {
        assert_eq!(strip_colors("^1Red^7 Server"), "Red Server");
        assert_eq!(strip_colors("plain"), "plain");
        assert_eq!(strip_colors("caret^"), "caret^");
        assert_eq!(strip_colors("a^^b"), "a^b");
    }

    #[test]
    fn test_parse_status_response() {
        let data = b"\xff\xff\xff\xffstatusResponse\n\\sv_hostname\\^2Frag ^7Fest\\mapname\\q3dm17\\sv_maxclients\\16\\g_gametype\\4\\fs_game\\cpma\\g_needpass\\1\\challenge\\abc\n5 48 \"player\"\n0 12 \"other\"\n";
        let reply = parse_status_response(data, Some("abc")).unwrap();

        assert_eq!(reply.name, "Frag Fest");
        assert_eq!(reply.terrain, "q3dm17");
        assert_eq!(reply.player_count, 2);
        assert_eq!(reply.player_limit, 16);
        assert_eq!(reply.game_type, "CTF");
        assert_eq!(reply.game_mod, "cpma");
        assert!(reply.password);
        assert_eq!(reply.ping, None);
    }

    #[test]
    fn test_parse_status_falls_back_to_gamename() {
        let data = b"\xff\xff\xff\xffstatusResponse\n\\sv_hostname\\x\\gamename\\baseoa\\fs_game\\\\g_gametype\\7\n";
        let reply = parse_status_response(data, None).unwrap();
        assert_eq!(reply.game_mod, "baseoa");
        assert_eq!(reply.game_type, "7");
        assert_eq!(reply.player_count, 0);
        assert!(!reply.password);
    }

    #[test]
    fn test_parse_status_rejects_wrong_challenge() {
        let data = b"\xff\xff\xff\xffstatusResponse\n\\sv_hostname\\x\\challenge\\zzz\n";
        assert!(parse_status_response(data, Some("abc")).is_err());
    }

    #[test]
    fn test_parse_status_rejects_broken_infostring() {
        assert!(parse_status_response(b"\xff\xff\xff\xffstatusResponse\n\\odd\n", None).is_err());
        assert!(parse_status_response(b"\xff\xff\xff\xffstatusResponse\nnoslash\n", None).is_err());
        assert!(parse_status_response(b"\xff\xff\xff\xffprint\nbanned\n", None).is_err());
    }
}
