// src/models/server.rs
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Live status fields a backend extracts from one probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReply {
    pub name: String,
    pub player_count: u32,
    pub player_limit: u32,
    pub password: bool,
    pub game_mod: String,
    pub game_type: String,
    pub terrain: String,
    /// Round trip in milliseconds, `None` when the backend could not measure it.
    pub ping: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub host: SocketAddr,
    pub password: bool,
    pub player_count: u32,
    pub player_limit: u32,
    pub ping: Option<u32>,
    pub country: String,
    pub name: String,
    pub game_id: String,
    pub game_mod: String,
    pub game_type: String,
    pub terrain: String,
}

impl ServerRecord {
    pub fn from_probe(game_id: &str, host: SocketAddr, reply: ProbeReply, country: String) -> Self {
        Self {
            host,
            password: reply.password,
            player_count: reply.player_count,
            player_limit: reply.player_limit,
            ping: reply.ping,
            country,
            name: reply.name,
            game_id: game_id.to_string(),
            game_mod: reply.game_mod,
            game_type: reply.game_type,
            terrain: reply.terrain,
        }
    }
}
