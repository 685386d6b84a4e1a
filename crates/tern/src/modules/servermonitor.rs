//! `servermonitor.*`: reads over the statistics store.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use tern_stats::{Category, StatsCore};

use crate::server::router::{params, reply, HandlerError, HandlerResult, Module};

/// Window used when the request gives no `from`.
const DEFAULT_WINDOW_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct LoadParams {
    category: String,
    #[serde(default)]
    from: Option<i64>,
    #[serde(default)]
    to: Option<i64>,
}

pub struct ServerMonitorModule {
    stats: Arc<StatsCore>,
}

impl ServerMonitorModule {
    pub fn new(stats: Arc<StatsCore>) -> Self {
        Self { stats }
    }

    fn load(&self, data: Value) -> HandlerResult {
        let p: LoadParams = params(data)?;
        let category: Category = p.category.parse()?;
        let to = p.to.unwrap_or_else(|| Utc::now().timestamp());
        let from = p.from.unwrap_or(to.saturating_sub(DEFAULT_WINDOW_SECS));
        if from > to {
            return Err(HandlerError::invalid(format!(
                "from ({from}) is after to ({to})"
            )));
        }
        reply(&self.stats.load_category(category, from, to)?)
    }
}

impl Module for ServerMonitorModule {
    fn name(&self) -> &'static str {
        "servermonitor"
    }

    fn handle(&self, action: &str, data: Value) -> HandlerResult {
        match action {
            "loadStatisticsData" => self.load(data),
            other => Err(HandlerError::unknown_action(self.name(), other)),
        }
    }
}
