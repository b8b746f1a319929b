use crate::server::SharedState;
use crate::state::ViewSnapshot;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;

pub async fn current_view(State(state): State<SharedState>) -> Json<ViewSnapshot> {
    Json(state.controller.snapshot())
}

/// One SSE event per state change, starting with the current snapshot.
pub async fn view_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = WatchStream::new(state.controller.subscribe())
        .map(|snapshot| Event::default().json_data(&snapshot));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
