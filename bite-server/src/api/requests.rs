//! Request endpoints.
//!
//! - `GET  /requests/open`                 – pending requests a volunteer can take
//! - `GET  /requests/mine`                 – requests the caller made
//! - `GET  /requests/assigned`             – requests assigned to the caller
//! - `GET  /requests/{request_id}`         – one request
//! - `POST /requests/{request_id}/accept`  – volunteer takes a pending request
//! - `POST /requests/{request_id}/status`  – advance to DELIVERED or COMPOSTED
//! - `POST /requests/{request_id}/release` – cancel or reject a pending claim

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use bite_sdk::objects::{AdvanceRequestStatus, RequestResponse};
use uuid::Uuid;

use super::ApiError;
use super::extractors::Caller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests/open", get(open_requests))
        .route("/requests/mine", get(my_requests))
        .route("/requests/assigned", get(assigned_requests))
        .route("/requests/{request_id}", get(get_request))
        .route("/requests/{request_id}/accept", post(accept_request))
        .route("/requests/{request_id}/status", post(advance_status))
        .route("/requests/{request_id}/release", post(release_claim))
}

fn to_responses(requests: &[bite_core::entities::Request]) -> Json<Vec<RequestResponse>> {
    Json(requests.iter().map(Into::into).collect())
}

async fn open_requests(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    Ok(to_responses(&state.api.open_requests(&caller).await?))
}

async fn my_requests(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    Ok(to_responses(&state.api.my_requests(&caller).await?))
}

async fn assigned_requests(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    Ok(to_responses(&state.api.assigned_requests(&caller).await?))
}

async fn get_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = state.api.get_request(&caller, request_id).await?;
    Ok(Json((&request).into()))
}

/// `POST /requests/{request_id}/accept`
///
/// First volunteer wins; later callers get `409 ALREADY_ASSIGNED`.
async fn accept_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = state.api.accept_request(&caller, request_id).await?;
    Ok(Json((&request).into()))
}

async fn advance_status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
    Json(body): Json<AdvanceRequestStatus>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = state
        .api
        .advance_status(&caller, request_id, body.status)
        .await?;
    Ok(Json((&request).into()))
}

async fn release_claim(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = state.api.release_claim(&caller, request_id).await?;
    Ok(Json((&request).into()))
}
