mod analyze;
mod health;
mod image;
mod metrics;
mod view;

use crate::controller::ControllerError;
use crate::server::SharedState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Router,
};
use thiserror::Error;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route(
            "/image",
            post(image::upload_image).delete(image::remove_image),
        )
        .route("/analyze", post(analyze::analyze_image))
        .route("/view", get(view::current_view))
        .route("/view/stream", get(view::view_stream))
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Controller failed: {0}")]
    Controller(#[from] ControllerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Something went wrong: {}", self),
        )
            .into_response()
    }
}
