// src/handlers/launch.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::error;
use serde::Deserialize;
use serde_json::json;

use super::LaunchLimiter;
use crate::engine::QueryEngine;
use crate::utils::{client_ip, RequestError};

#[derive(Deserialize)]
pub struct LaunchRequest {
    pub host: String,
    #[serde(default)]
    pub password: String,
}

pub async fn launch_game(
    req: HttpRequest,
    engine: web::Data<QueryEngine>,
    path: web::Path<String>,
    body: web::Json<LaunchRequest>,
    rate_limiter: web::Data<LaunchLimiter>,
) -> Result<HttpResponse, RequestError> {
    let peer_ip = client_ip(&req)?;
    if rate_limiter.0.check_key(&peer_ip).is_err() {
        error!("Rate limit exceeded for launch for ip: {}", peer_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let game_id = path.into_inner();
    if let Err(e) = engine.start_game(&game_id, &body.host, &body.password) {
        error!("Failed to launch {}: {}", game_id, e);
        return Err(e.into());
    }

    Ok(HttpResponse::Ok().json(json!({ "game": game_id, "host": body.host.trim() })))
}
