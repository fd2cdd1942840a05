// src/handlers.rs
use actix_web::{HttpResponse, web};
use base64::{Engine as _, engine::general_purpose};
use log::info;
use uuid::Uuid;

use crate::AppState;
use crate::errors::PixelforgeError;
use crate::models::{ArchiveRequest, ArchiveResponse, GenerateRequest, GenerateResponse};
use crate::services::codec;

pub async fn generate_image(
    body: web::Json<GenerateRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PixelforgeError> {
    let request = body.into_inner();
    request.validate()?;

    let generation = data.generation.as_ref().ok_or_else(|| {
        PixelforgeError::Configuration("PROVIDER_API_KEY is not set".to_string())
    })?;

    let tag = Uuid::new_v4();
    info!(
        "[{}] Generating image: {} chars, style {}, ratio {}",
        tag,
        request.prompt.len(),
        request.style,
        request.ratio
    );

    let artifact = generation.generate(&request).await?;

    info!(
        "[{}] Generated {} bytes with seed {}",
        tag,
        artifact.data.len(),
        artifact.seed
    );

    Ok(HttpResponse::Ok().json(GenerateResponse {
        image: codec::encode(&artifact.data),
        seed: artifact.seed,
    }))
}

pub async fn bundle_archive(
    body: web::Json<ArchiveRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PixelforgeError> {
    let request = body.into_inner();

    let outcome = data.archive.bundle(&request.images)?;

    info!(
        "Bundled {} of {} images into a {} byte archive",
        outcome.count,
        request.images.len(),
        outcome.data.len()
    );

    Ok(HttpResponse::Ok().json(ArchiveResponse {
        zip: general_purpose::STANDARD.encode(&outcome.data),
        count: outcome.count,
    }))
}
