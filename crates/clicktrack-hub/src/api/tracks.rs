//! Catalog, join-address and health handlers.

use actix_web::{HttpResponse, Responder, get, web};
use clicktrack_types::{ErrorResponse, HealthResponse, HubConfigResponse, TracksResponse};

use crate::state::AppState;

/// List the tracks in the media directory.
#[utoipa::path(
    get,
    path = "/tracks",
    responses(
        (status = 200, description = "Playable tracks", body = TracksResponse),
        (status = 500, description = "Catalog could not be read", body = ErrorResponse)
    )
)]
#[get("/tracks")]
pub async fn list_tracks(state: web::Data<AppState>) -> impl Responder {
    let catalog = state.catalog.clone();
    let listed = web::block(move || catalog.list_tracks()).await;
    match listed {
        Ok(Ok(tracks)) => HttpResponse::Ok().json(TracksResponse { tracks }),
        Ok(Err(err)) => {
            tracing::warn!(error = %format!("{err:#}"), "list tracks failed");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to list tracks.".to_string(),
            })
        }
        Err(err) => {
            tracing::warn!(error = %err, "list tracks task failed");
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to list tracks.".to_string(),
            })
        }
    }
}

#[utoipa::path(
    get,
    path = "/config",
    responses(
        (status = 200, description = "Address devices should join", body = HubConfigResponse)
    )
)]
#[get("/config")]
pub async fn hub_config(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(&state.advertised)
}

/// Basic health check for devices and operators.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Hub is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
