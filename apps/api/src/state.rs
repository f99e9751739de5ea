use std::sync::Arc;

use crate::config::Config;
use crate::ranking::engine::RankingEngine;
use crate::ranking::sink::ResultSink;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: RankingEngine,
    /// Where ranked tables are persisted. Default: CsvFileSink at SCORES_CSV_PATH.
    pub sink: Arc<dyn ResultSink>,
    pub config: Config,
}
