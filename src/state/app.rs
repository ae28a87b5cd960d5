use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::records_service::RecordsService;

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub records: RecordsService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(records: RecordsService, config: AppConfig) -> Self {
        Self {
            records,
            config: Arc::new(config),
        }
    }
}
