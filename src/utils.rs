// src/utils.rs
use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use log::debug;
use serde_json::json;
use std::net::IpAddr;
use thiserror::Error;

use crate::error::{LaunchFailure, QueryError, SettingsError};

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Failed to extract client IP")]
    MissingPeerIP,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Unknown game: {0}")]
    UnknownGame(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl ResponseError for RequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::UnknownGame(_)
            | Self::Query(QueryError::UnknownGame(_))
            | Self::Launch(LaunchFailure::UnknownGame(_))
            | Self::Settings(SettingsError::UnknownGame(_)) => StatusCode::NOT_FOUND,
            Self::Launch(LaunchFailure::Spawn { .. }) | Self::Settings(SettingsError::Io(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Address used to key the per-client rate limiters.
pub fn client_ip(req: &HttpRequest) -> Result<IpAddr, RequestError> {
    let ip = req
        .peer_addr()
        .map(|addr| addr.ip())
        .ok_or(RequestError::MissingPeerIP)?;
    debug!("{} {} from {}", req.method(), req.path(), ip);
    Ok(ip)
}
