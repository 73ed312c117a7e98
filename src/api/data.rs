//! Chart data endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use serde::Deserialize;

use super::MonitorState;
use crate::measurement::{Measurement, MeasurementFilter};

pub const DEFAULT_LATEST_COUNT: u32 = 20;
pub const MAX_LATEST_COUNT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub count: Option<u32>,
}

pub fn clamp_latest_count(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_LATEST_COUNT)
        .clamp(1, MAX_LATEST_COUNT)
}

/// Bucket-averaged measurements for the filter window, ascending.
pub async fn query_data(
    Extension(state): Extension<Arc<MonitorState>>,
    Json(filter): Json<MeasurementFilter>,
) -> Result<Json<Vec<Measurement>>, (StatusCode, String)> {
    state.db.aggregate(&filter).map(Json).map_err(internal_error)
}

/// Most recent raw measurements, newest first.
pub async fn latest_data(
    Extension(state): Extension<Arc<MonitorState>>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<Vec<Measurement>>, (StatusCode, String)> {
    state
        .db
        .latest(clamp_latest_count(query.count))
        .map(Json)
        .map_err(internal_error)
}

fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    log::error!("{e:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_count_defaults_and_clamps() {
        assert_eq!(clamp_latest_count(None), DEFAULT_LATEST_COUNT);
        assert_eq!(clamp_latest_count(Some(0)), 1);
        assert_eq!(clamp_latest_count(Some(7)), 7);
        assert_eq!(clamp_latest_count(Some(100_000)), MAX_LATEST_COUNT);
    }
}
