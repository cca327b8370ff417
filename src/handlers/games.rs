// src/handlers/games.rs
use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::engine::QueryEngine;
use crate::geo::country_codes;
use crate::models::game::{BackendKind, QueryStatus, SettingValue};
use crate::utils::RequestError;

#[derive(Serialize)]
struct GameSummary<'a> {
    id: &'a str,
    name: &'a str,
    backend: BackendKind,
    status: QueryStatus,
    servers: usize,
}

pub async fn list_games(engine: web::Data<QueryEngine>) -> HttpResponse {
    let snapshot = engine.game_table();
    let mut games: Vec<GameSummary> = snapshot
        .games
        .iter()
        .map(|(id, slot)| GameSummary {
            id,
            name: &slot.info.name,
            backend: slot.info.backend,
            status: slot.status,
            servers: slot.servers.len(),
        })
        .collect();
    games.sort_by(|a, b| a.name.cmp(b.name));

    HttpResponse::Ok().json(games)
}

pub async fn get_game(
    engine: web::Data<QueryEngine>,
    path: web::Path<String>,
) -> Result<HttpResponse, RequestError> {
    let game_id = path.into_inner();
    let slot = engine
        .table()
        .get(&game_id)
        .ok_or(RequestError::UnknownGame(game_id))?;
    Ok(HttpResponse::Ok().json(&*slot))
}

pub async fn set_setting(
    engine: web::Data<QueryEngine>,
    path: web::Path<(String, String)>,
    value: web::Json<SettingValue>,
) -> Result<HttpResponse, RequestError> {
    let (game_id, option) = path.into_inner();
    engine.set_setting(&game_id, &option, value.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn countries() -> HttpResponse {
    HttpResponse::Ok().json(country_codes())
}
