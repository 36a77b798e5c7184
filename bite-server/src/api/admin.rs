//! Admin endpoints.
//!
//! - `GET /admin/events/ws` – live engine events (status changes and audit
//!   candidates) as [`EventWsMessage`] frames

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use bite_core::matching::MatchingError;
use bite_sdk::objects::Role;
use bite_sdk::objects::ws::{EventWsMessage, WsCloseCode};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::ApiError;
use super::extractors::Caller;
use super::tracking::send_json;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/events/ws", get(events_ws))
}

async fn events_ws(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match caller.role {
        Role::Admin => {}
        Role::Donor | Role::Ngo | Role::Needy | Role::Volunteer | Role::CompostAgency => {
            return ApiError::from(MatchingError::Forbidden("admin only")).into_response();
        }
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    // Subscribe before the upgrade completes so nothing emitted in between
    // is missed.
    let events = BroadcastStream::new(state.events.subscribe());
    ws.on_upgrade(move |socket| relay_events(socket, events, state))
}

async fn relay_events(
    mut socket: WebSocket,
    mut events: BroadcastStream<bite_core::events::EngineEvent>,
    state: AppState,
) {
    let mut shutdown_rx = state.shutdown.clone();
    tracing::debug!("WS: admin event relay started");

    loop {
        tokio::select! {
            event = events.next() => {
                let msg = match event {
                    Some(Ok(event)) => EventWsMessage::from(event),
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(skipped, "WS: admin event relay lagged");
                        EventWsMessage::Lagged { skipped }
                    }
                    None => break,
                };
                if send_json(&mut socket, &msg).await.is_err() {
                    return;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: WsCloseCode::NORMAL,
            reason: "event stream ended".into(),
        })))
        .await;
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestServer;
    use axum::http::{Method, StatusCode};
    use bite_sdk::objects::ErrorResponse;

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let server = TestServer::new();
        let (status, body): (_, ErrorResponse) = server
            .json(&server.volunteer, Method::GET, "/api/v1/admin/events/ws", None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "FORBIDDEN");
    }
}
