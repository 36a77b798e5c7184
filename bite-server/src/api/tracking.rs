//! Live delivery tracking endpoints.
//!
//! - `POST   /requests/{request_id}/tracking`          – volunteer publishes a position
//! - `DELETE /requests/{request_id}/tracking`          – end tracking early
//! - `GET    /requests/{request_id}/tracking/latest`   – last known position, or `null`
//! - `GET    /requests/{request_id}/tracking/history`  – recent positions, oldest first
//! - `GET    /requests/{request_id}/tracking/ws`       – WebSocket position stream

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use bite_core::matching::MatchingError;
use bite_sdk::objects::ws::{TrackingWsMessage, WsCloseCode};
use bite_sdk::objects::{PublishSample, TrackingSampleResponse};
use bite_sdk::signature::Identity;
use uuid::Uuid;

use super::ApiError;
use super::extractors::Caller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/requests/{request_id}/tracking",
            post(publish_sample).delete(end_tracking),
        )
        .route("/requests/{request_id}/tracking/latest", get(latest_sample))
        .route("/requests/{request_id}/tracking/history", get(tracking_history))
        .route("/requests/{request_id}/tracking/ws", get(tracking_ws))
}

async fn publish_sample(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    Json(body): Json<PublishSample>,
) -> Result<Json<TrackingSampleResponse>, ApiError> {
    let sample = state.api.publish_sample(&caller, request_id, body).await?;
    Ok(Json((&sample).into()))
}

async fn end_tracking(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.api.end_tracking(&caller, request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn latest_sample(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Option<TrackingSampleResponse>>, ApiError> {
    let sample = state.api.latest_sample(&caller, request_id).await?;
    Ok(Json(sample.as_ref().map(Into::into)))
}

async fn tracking_history(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Vec<TrackingSampleResponse>>, ApiError> {
    let samples = state.api.tracking_history(&caller, request_id).await?;
    Ok(Json(samples.iter().map(Into::into).collect()))
}

/// `GET /requests/{request_id}/tracking/ws`
///
/// Authorization happens after the upgrade so refusals reach the client as
/// an `error` frame plus a close code it can act on.
async fn tracking_ws(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_tracking_ws(socket, state, caller, request_id))
}

fn close_code(err: &MatchingError) -> u16 {
    match err {
        MatchingError::NotFound(_) => WsCloseCode::REQUEST_NOT_FOUND,
        MatchingError::Forbidden(_) | MatchingError::ActorNotEligible => WsCloseCode::FORBIDDEN,
        MatchingError::TrackingClosed => WsCloseCode::TRACKING_CLOSED,
        _ => WsCloseCode::INTERNAL_ERROR,
    }
}

/// Drives one observer connection.
///
/// 1. Subscribes, which also yields the latest sample if there is one.
/// 2. Forwards every sample until the topic closes, then sends `closed`
///    and a normal close frame.
/// 3. Stops early when the client goes away or the server shuts down.
async fn handle_tracking_ws(
    mut socket: WebSocket,
    state: AppState,
    caller: Identity,
    request_id: Uuid,
) {
    let mut subscription = match state.api.subscribe_tracking(&caller, request_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::debug!(error = %e, %request_id, "WS: tracking subscription refused");
            let code = close_code(&e);
            let reason = e.to_string();
            let _ = send_json(
                &mut socket,
                &TrackingWsMessage::Error {
                    code,
                    reason: reason.clone(),
                },
            )
            .await;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })))
                .await;
            return;
        }
    };
    let mut shutdown_rx = state.shutdown.clone();

    loop {
        tokio::select! {
            sample = subscription.next() => {
                let Some(sample) = sample else {
                    let _ = send_json(&mut socket, &TrackingWsMessage::Closed).await;
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: WsCloseCode::NORMAL,
                            reason: "tracking closed".into(),
                        })))
                        .await;
                    return;
                };
                let msg = TrackingWsMessage::Sample {
                    sample: (&sample).into(),
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
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: WsCloseCode::NORMAL,
                            reason: "server shutting down".into(),
                        })))
                        .await;
                    return;
                }
            }
        }
    }
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
pub(super) async fn send_json<T: serde::Serialize>(
    socket: &mut WebSocket,
    value: &T,
) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{SECRET, TestServer};
    use axum::http::{Method, StatusCode};
    use bite_sdk::client::{ClientError, MatchingClient};
    use bite_sdk::objects::{
        ErrorResponse, RequestResponse, RequestStatus, TrackingSampleResponse,
    };
    use serde_json::json;
    use uuid::Uuid;

    /// A claimed and accepted request, ready to be tracked.
    async fn accepted(server: &TestServer) -> Uuid {
        let donation_id = server.create_donation("HUMAN").await;
        let (_, request): (_, RequestResponse) = server
            .json(
                &server.ngo,
                Method::POST,
                &format!("/api/v1/donations/{donation_id}/claim"),
                Some(json!({})),
            )
            .await;
        let (status, _): (_, RequestResponse) = server
            .json(
                &server.volunteer,
                Method::POST,
                &format!("/api/v1/requests/{}/accept", request.request_id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        request.request_id
    }

    #[tokio::test]
    async fn test_latest_is_null_before_first_sample() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let (status, body) = server
            .send(
                &server.ngo,
                Method::GET,
                &format!("/api/v1/requests/{request_id}/tracking/latest"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"null");
    }

    #[tokio::test]
    async fn test_publish_then_poll() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let uri = format!("/api/v1/requests/{request_id}/tracking");

        for (lat, lon) in [(12.90, 77.60), (12.91, 77.61)] {
            let (status, sample): (_, TrackingSampleResponse) = server
                .json(
                    &server.volunteer,
                    Method::POST,
                    &uri,
                    Some(json!({"latitude": lat, "longitude": lon})),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(sample.volunteer_id, server.volunteer.user_id);
        }

        let (_, latest): (_, Option<TrackingSampleResponse>) = server
            .json(&server.donor, Method::GET, &format!("{uri}/latest"), None)
            .await;
        assert_eq!(latest.unwrap().latitude, 12.91);

        let (_, history): (_, Vec<TrackingSampleResponse>) = server
            .json(&server.ngo, Method::GET, &format!("{uri}/history"), None)
            .await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].latitude, 12.90);
    }

    #[tokio::test]
    async fn test_only_assigned_volunteer_publishes() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let (status, _): (_, ErrorResponse) = server
            .json(
                &server.ngo,
                Method::POST,
                &format!("/api/v1/requests/{request_id}/tracking"),
                Some(json!({"latitude": 1.0, "longitude": 1.0})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_out_of_range_coordinates_are_rejected() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let (status, body): (_, ErrorResponse) = server
            .json(
                &server.volunteer,
                Method::POST,
                &format!("/api/v1/requests/{request_id}/tracking"),
                Some(json!({"latitude": 95.0, "longitude": 1.0})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION");
    }

    #[tokio::test]
    async fn test_publish_after_delivery_is_gone() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let (status, delivered): (_, RequestResponse) = server
            .json(
                &server.volunteer,
                Method::POST,
                &format!("/api/v1/requests/{request_id}/status"),
                Some(json!({"status": "DELIVERED"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(delivered.status, RequestStatus::Delivered);

        let (status, body): (_, ErrorResponse) = server
            .json(
                &server.volunteer,
                Method::POST,
                &format!("/api/v1/requests/{request_id}/tracking"),
                Some(json!({"latitude": 1.0, "longitude": 1.0})),
            )
            .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body.code, "TRACKING_CLOSED");
    }

    #[tokio::test]
    async fn test_end_tracking_returns_no_content() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let (status, body) = server
            .send(
                &server.volunteer,
                Method::DELETE,
                &format!("/api/v1/requests/{request_id}/tracking"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_ws_streams_samples_until_delivery() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let base = server.serve().await;
        let volunteer = MatchingClient::new(base.clone(), SECRET, server.volunteer);
        let requester = MatchingClient::new(base, SECRET, server.ngo);

        volunteer.publish_sample(request_id, 12.90, 77.60).await.unwrap();

        let mut stream = requester.subscribe_tracking(request_id).await.unwrap();
        // A late subscriber first sees the latest known position.
        let first = stream.next_sample().await.unwrap().unwrap();
        assert_eq!(first.latitude, 12.90);

        volunteer.publish_sample(request_id, 12.95, 77.65).await.unwrap();
        let second = stream.next_sample().await.unwrap().unwrap();
        assert_eq!(second.latitude, 12.95);

        volunteer
            .advance_status(request_id, RequestStatus::Delivered)
            .await
            .unwrap();
        assert!(stream.next_sample().await.unwrap().is_none());

        let err = volunteer
            .publish_sample(request_id, 13.0, 77.7)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status, .. } if status == StatusCode::GONE));
    }

    #[tokio::test]
    async fn test_ws_refuses_outsiders() {
        let server = TestServer::new();
        let request_id = accepted(&server).await;
        let base = server.serve().await;
        let outsider = MatchingClient::new(
            base,
            SECRET,
            bite_sdk::signature::Identity::new(Uuid::now_v7(), bite_sdk::objects::Role::Needy),
        );
        let mut stream = outsider.subscribe_tracking(request_id).await.unwrap();
        assert!(stream.next_sample().await.unwrap().is_none());
    }
}
