use crate::picker::BoxError;
use crate::routes::ApiError;
use crate::server::SharedState;
use crate::state::ViewSnapshot;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use futures::{StreamExt, TryStreamExt};
use tracing::instrument;

/// The request body is the file; the declared media type rides on the
/// `Content-Type` header and is validated by the picker.
#[instrument(skip(state, headers, body))]
pub async fn upload_image(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ViewSnapshot>, ApiError> {
    state.metrics.record_request("upload_image");

    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let data = body
        .into_data_stream()
        .map_err(|e| Box::new(e) as BoxError)
        .boxed();

    let snapshot = state.controller.accept_upload(media_type, data).await?;
    Ok(Json(snapshot))
}

#[instrument(skip(state))]
pub async fn remove_image(State(state): State<SharedState>) -> Result<Json<ViewSnapshot>, ApiError> {
    state.metrics.record_request("remove_image");

    let snapshot = state.controller.remove_image().await?;
    Ok(Json(snapshot))
}
