//! Shared application state for the HTTP layer.

use std::sync::Arc;

use clicktrack_types::HubConfigResponse;

use crate::catalog::TrackCatalog;

pub struct AppState {
    pub catalog: Arc<dyn TrackCatalog>,
    /// Join address advertised on `/config`.
    pub advertised: HubConfigResponse,
}

impl AppState {
    pub fn new(catalog: Arc<dyn TrackCatalog>, advertised: HubConfigResponse) -> Self {
        Self {
            catalog,
            advertised,
        }
    }
}
