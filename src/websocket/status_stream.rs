use axum::{
    extract::{
        ws::rejection::WebSocketUpgradeRejection,
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::{extract_key, WsStatusQuery};
use crate::{
    api::{control_key::key_matches, error::ControlApiError},
    app::App,
    jobs::StatusEvent,
};

/// Streams job status events as JSON text frames.
///
/// The key and the job filter are checked before the upgrade request itself.
pub async fn status_stream_handler(
    Query(query): Query<WsStatusQuery>,
    headers: HeaderMap,
    State(app): State<App>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let authorized = extract_key(&query, &headers)
        .is_some_and(|key| key_matches(&app.config.control.api_key, key));
    if !authorized {
        return ControlApiError::Unauthorized.into_response();
    }

    let events = match &query.job {
        Some(job) if !app.jobs.contains(job) => {
            return (StatusCode::NOT_FOUND, format!("No job named '{job}'")).into_response();
        }
        Some(job) => app.status().subscribe(job),
        None => app.status().subscribe_all(),
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| stream_events(socket, events)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn stream_events(socket: WebSocket, mut events: broadcast::Receiver<StatusEvent>) {
    let connection_id = Uuid::new_v4();
    info!("🔌 Status stream opened: {}", connection_id);

    let (mut sender, mut receiver) = socket.split();

    let outgoing = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(serialized) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(serialized.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        "Status stream {} fell behind, {} events dropped",
                        connection_id, missed
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    let incoming = async {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => debug!("Ignoring message on status stream {}", connection_id),
            }
        }
    };

    tokio::select! {
        () = outgoing => {},
        () = incoming => {},
    }

    info!("🔌 Status stream closed: {}", connection_id);
}
