// src/error.rs
use std::net::SocketAddr;
use thiserror::Error;

use crate::models::game::{BackendKind, QueryStatus, SettingKind};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("Probe of {0} timed out")]
    ProbeTimeout(SocketAddr),

    #[error("Malformed reply from {addr}: {reason}")]
    ProbeMalformed { addr: SocketAddr, reason: String },

    #[error("No servers answered for {0}")]
    NoServersFound(String),

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Cycle for {0} ended without delivering a result")]
    CycleAborted(String),

    #[error("No backend bound for {kind} (game {game})")]
    UnsupportedBackend { game: String, kind: BackendKind },

    #[error(transparent)]
    Status(#[from] StatusError),
}

impl QueryError {
    pub fn malformed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::ProbeMalformed {
            addr,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Illegal status transition for {game}: {from} -> {to}")]
    IllegalTransition {
        game: String,
        from: QueryStatus,
        to: QueryStatus,
    },
}

#[derive(Debug, Error)]
pub enum LaunchFailure {
    #[error("Server host must not be empty")]
    EmptyHost,

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Game {0} has no launch mapping")]
    NoLaunchMapping(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Game {game} is bound to {kind}, which has no backend")]
    UnsupportedBackend { game: String, kind: BackendKind },

    #[error("Game {0} is registered twice")]
    DuplicateGame(String),

    #[error("Option {option} of {game} declares {declared:?} but defaults to {actual:?}")]
    InvalidDefault {
        game: String,
        option: String,
        declared: SettingKind,
        actual: SettingKind,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error("Game {game} has no option {option}")]
    UnknownOption { game: String, option: String },

    #[error("Option {option} of {game} expects {expected:?}, got {actual:?}")]
    TypeMismatch {
        game: String,
        option: String,
        expected: SettingKind,
        actual: SettingKind,
    },

    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
