//! HTTP and websocket handlers.

pub mod tracks;
pub mod ws;

pub use tracks::{health, hub_config, list_tracks};
pub use ws::device_ws;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use actix_web::{App, test, web};
    use clicktrack_types::{HealthResponse, HubConfigResponse, TracksResponse};

    use crate::api;
    use crate::catalog::{DirCatalog, TrackCatalog};
    use crate::state::AppState;

    fn make_root() -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "clicktrack-hub-api-smoke-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&root).expect("create temp dir");
        root
    }

    fn make_state(catalog: Arc<dyn TrackCatalog>) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            catalog,
            HubConfigResponse {
                base_url: "http://10.0.0.5:3000".to_string(),
                ws_url: "ws://10.0.0.5:3000/ws".to_string(),
                port: 3000,
            },
        ))
    }

    struct FailingCatalog;

    impl TrackCatalog for FailingCatalog {
        fn list_tracks(&self) -> anyhow::Result<Vec<clicktrack_types::TrackSummary>> {
            Err(anyhow::anyhow!("permission denied"))
        }
    }

    #[actix_web::test]
    async fn tracks_lists_media_directory() {
        let root = make_root();
        std::fs::write(root.join("intro.mp3"), b"").unwrap();
        let state = make_state(Arc::new(DirCatalog::new(&root)));
        let app = test::init_service(App::new().app_data(state).service(api::list_tracks)).await;

        let req = test::TestRequest::get().uri("/tracks").to_request();
        let resp: TracksResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.tracks.len(), 1);
        assert_eq!(resp.tracks[0].id, "intro");
        assert_eq!(resp.tracks[0].url, "/audio/intro.mp3");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[actix_web::test]
    async fn tracks_reports_failure_as_500() {
        let state = make_state(Arc::new(FailingCatalog));
        let app = test::init_service(App::new().app_data(state).service(api::list_tracks)).await;

        let req = test::TestRequest::get().uri("/tracks").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Failed to list tracks.");
    }

    #[actix_web::test]
    async fn config_returns_advertised_address() {
        let state = make_state(Arc::new(FailingCatalog));
        let app = test::init_service(App::new().app_data(state).service(api::hub_config)).await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let resp: HubConfigResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.port, 3000);
        assert_eq!(resp.ws_url, "ws://10.0.0.5:3000/ws");
    }

    #[actix_web::test]
    async fn health_reports_ok() {
        let app = test::init_service(App::new().service(api::health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.status, "ok");
        assert!(!resp.version.is_empty());
    }
}
