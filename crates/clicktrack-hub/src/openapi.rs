use actix_web::{HttpResponse, Responder, get};
use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::tracks::list_tracks,
        api::tracks::hub_config,
        api::tracks::health,
    ),
    components(
        schemas(
            clicktrack_types::TrackSummary,
            clicktrack_types::TracksResponse,
            clicktrack_types::HubConfigResponse,
            clicktrack_types::HealthResponse,
            clicktrack_types::ErrorResponse,
        )
    ),
    tags(
        (name = "clicktrack-hub", description = "Synchronized playback hub")
    )
)]
pub struct ApiDoc;

#[get("/api-doc/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}
