use crate::routes::ApiError;
use crate::server::SharedState;
use crate::state::ViewSnapshot;
use axum::{extract::State, Json};
use std::time::Instant;
use tracing::instrument;

/// Runs the prediction and responds with the final snapshot; the transient
/// loading state is visible on `/view` and `/view/stream` in the meantime.
#[instrument(skip(state))]
pub async fn analyze_image(State(state): State<SharedState>) -> Result<Json<ViewSnapshot>, ApiError> {
    state.metrics.record_request("analyze_image");

    let started = Instant::now();
    let snapshot = state.controller.analyze().await?;
    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, "analyze_image");

    Ok(Json(snapshot))
}
