// src/handlers/servers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error};
use serde::Deserialize;
use serde_json::json;

use super::UpdateLimiter;
use crate::engine::{QueryEngine, UpdateRequest};
use crate::utils::{client_ip, RequestError};

pub async fn get_servers(
    engine: web::Data<QueryEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, RequestError> {
    let game_id = path.into_inner();
    let slot = engine
        .table()
        .get(&game_id)
        .ok_or_else(|| RequestError::UnknownGame(game_id.clone()))?;

    debug!("Serving {} servers for {}", slot.servers.len(), game_id);
    Ok(HttpResponse::Ok().json(json!({
        "game": game_id,
        "status": slot.status,
        "servers": slot.servers,
    })))
}

#[derive(Deserialize)]
pub struct UpdateQuery {
    #[serde(default)]
    wait: bool,
}

pub async fn update_servers(
    req: HttpRequest,
    engine: web::Data<QueryEngine>,
    path: web::Path<String>,
    query: web::Query<UpdateQuery>,
    rate_limiter: web::Data<UpdateLimiter>,
) -> Result<HttpResponse, RequestError> {
    let peer_ip = client_ip(&req)?;
    if rate_limiter.0.check_key(&peer_ip).is_err() {
        error!("Rate limit exceeded for server list update for ip: {}", peer_ip);
        return Err(RequestError::RateLimitExceeded);
    }

    let game_id = path.into_inner();
    if query.wait {
        let snapshot = engine.refresh(&game_id).await?;
        let slot = snapshot
            .get(&game_id)
            .ok_or_else(|| RequestError::UnknownGame(game_id.clone()))?;
        return Ok(HttpResponse::Ok().json(slot));
    }

    let request = engine.update_server_list(&game_id, |game, snapshot| {
        debug!(
            "Update of {} delivered: {:?}, {} servers",
            game,
            snapshot.status(game),
            snapshot.servers(game).len()
        );
    })?;

    Ok(HttpResponse::Accepted().json(json!({
        "game": game_id,
        "coalesced": request == UpdateRequest::Coalesced,
    })))
}
