// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use log::{info, warn};
use std::sync::Arc;

mod config;
mod errors;
mod handlers;
mod models;
mod services;

use crate::config::Config;
use crate::handlers::{bundle_archive, generate_image};
use crate::services::generation::PollConfig;
use crate::services::{ArchiveService, GenerationService, HttpImageProvider};

#[derive(Clone)]
pub struct AppState {
    // Absent when the provider credential is missing; health checks keep
    // serving while every generation request reports the misconfiguration.
    generation: Option<Arc<GenerationService>>,
    archive: Arc<ArchiveService>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Pixelforge service...");

    let config = Config::from_env();

    let generation = match HttpImageProvider::new(&config.provider) {
        Ok(provider) => Some(Arc::new(GenerationService::new(
            Arc::new(provider),
            config.provider.model.clone(),
            PollConfig::default(),
        ))),
        Err(e) => {
            warn!("Generation disabled: {e}");
            None
        }
    };

    let app_state = AppState {
        generation,
        archive: Arc::new(ArchiveService::new()),
    };

    info!("Starting HTTP server on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1")
                    .route("/generate", web::post().to(generate_image))
                    .route("/archive", web::post().to(bundle_archive)),
            )
            .route("/health", web::get().to(health_check))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "pixelforge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
