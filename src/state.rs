use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Db;
use crate::services::conversation::CallEngine;
use crate::services::profiles::ProfileStore;
use crate::services::scheduling::Scheduler;

pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub engine: CallEngine,
    pub scheduler: Arc<Scheduler>,
    pub profiles: Box<dyn ProfileStore>,
}
