// src/main.rs
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;

use srvscout::backends::BackendSet;
use srvscout::config::Config;
use srvscout::geo::GeoResolver;
use srvscout::handlers::{self, LaunchLimiter, UpdateLimiter};
use srvscout::launcher::SystemLauncher;
use srvscout::registry::GameRegistry;
use srvscout::{settings, GameTable, QueryEngine};

async fn load_geolocation(config: &Config) -> GeoResolver {
    let geo = GeoResolver::new();
    let loaded = if let Some(path) = &config.geo_db_path {
        geo.load_file(Path::new(path)).await
    } else if let Some(url) = &config.geo_db_url {
        geo.fetch(url).await
    } else {
        info!("No geolocation database configured, every server will be located as unknown");
        return geo;
    };
    if let Err(e) = loaded {
        warn!("Failed to load geolocation ranges: {}", e);
    }
    geo
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();

    let backends = BackendSet::builtin(config.master_timeout());
    let games = GameRegistry::builtin().build(&backends).map_err(|e| {
        error!("Invalid game registry: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })?;
    info!("Registered {} games", games.len());

    let table = Arc::new(GameTable::new(games));
    let settings_path = Path::new(&config.settings_path).to_path_buf();
    if let Err(e) = settings::load(&settings_path, &table) {
        warn!("Could not load settings from {}: {}", settings_path.display(), e);
    }

    let geo = Arc::new(load_geolocation(&config).await);
    let engine = QueryEngine::new(
        Arc::clone(&table),
        backends,
        geo,
        Arc::new(SystemLauncher),
        config.query(),
    );
    engine.tracker().subscribe(|event| {
        info!("{}: {} -> {}", event.game_id, event.from, event.to);
    });

    let engine = web::Data::from(engine);
    let update_limiter = web::Data::new(UpdateLimiter::new(config.update_quota()));
    let launch_limiter = web::Data::new(LaunchLimiter::new(config.launch_quota()));

    let bind = config.bind();
    info!("Starting server on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .app_data(update_limiter.clone())
            .app_data(launch_limiter.clone())
            .configure(handlers::configure)
    })
        .bind(&bind)?
        .run().await?;

    info!("Shutting down, saving settings to {}", settings_path.display());
    if let Err(e) = settings::save(&settings_path, &table) {
        error!("Failed to save settings: {}", e);
    }
    Ok(())
}
