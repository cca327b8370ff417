pub mod games;
pub mod index;
pub mod launch;
pub mod servers;

use actix_web::web;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::net::IpAddr;

pub type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Per-client limiter for update requests.
pub struct UpdateLimiter(pub KeyedLimiter);

/// Per-client limiter for launch requests.
pub struct LaunchLimiter(pub KeyedLimiter);

impl UpdateLimiter {
    pub fn new(quota: Quota) -> Self {
        Self(RateLimiter::keyed(quota))
    }
}

impl LaunchLimiter {
    pub fn new(quota: Quota) -> Self {
        Self(RateLimiter::keyed(quota))
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index::index))
        .route("/games", web::get().to(games::list_games))
        .route("/games/{id}", web::get().to(games::get_game))
        .route("/games/{id}/servers", web::get().to(servers::get_servers))
        .route("/games/{id}/update", web::post().to(servers::update_servers))
        .route("/games/{id}/launch", web::post().to(launch::launch_game))
        .route("/games/{id}/settings/{option}", web::put().to(games::set_setting))
        .route("/geo/countries", web::get().to(games::countries));
}
