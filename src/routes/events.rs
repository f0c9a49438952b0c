use axum::{
    extract::{State, Path},
    response::{IntoResponse, sse::{Event, KeepAlive, Sse}},
    http::StatusCode,
};
use futures_util::{stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use crate::{AppState, RaisedUpdate};
use crate::db;

/// Streams a project's raised total: the current value first, then every change.
pub async fn project_events(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Subscribe before reading so an update landing in between is not lost.
    let rx = state.raised_tx.subscribe();

    let project = match db::get_project(&state.db, &id).await {
        Ok(Some(p)) => p,
        Ok(None) => return (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            tracing::error!("DB Query Error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database Error").into_response();
        }
    };

    let initial = RaisedUpdate {
        project_id: project.id.clone(),
        raised: project.raised,
    };
    let store = state.db.clone();
    let updates = BroadcastStream::new(rx).filter_map(move |msg| {
        let id = id.clone();
        let store = store.clone();
        async move {
            match msg {
                Ok(update) if update.project_id == id => Some(update),
                Ok(_) => None,
                // Skipped updates may include this project; resend the stored total.
                Err(e) => {
                    tracing::debug!("raised stream lagged: {}", e);
                    match db::get_project(&store, &id).await {
                        Ok(Some(p)) => Some(RaisedUpdate {
                            project_id: p.id,
                            raised: p.raised,
                        }),
                        Ok(None) => None,
                        Err(e) => {
                            tracing::warn!("Reloading project {} after lag failed: {}", id, e);
                            None
                        }
                    }
                }
            }
        }
    });

    let events = stream::once(async move { initial })
        .chain(updates)
        .map(|update| Event::default().event("raised").json_data(&update));

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}
