//! Donation endpoints.
//!
//! - `POST /donations`                         – donor posts surplus food
//! - `GET  /donations/mine`                    – donor's own donations
//! - `GET  /donations/available/{type}`        – browse claimable donations
//! - `GET  /donations/{donation_id}`           – one donation
//! - `GET  /donations/{donation_id}/requests`  – claims made on a donation
//! - `POST /donations/{donation_id}/claim`     – claim a donation
//! - `POST /donations/{donation_id}/withdraw`  – donor takes a donation back

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use bite_sdk::objects::{
    ClaimDonation, CreateDonation, DonationResponse, DonationType, RequestResponse,
};
use uuid::Uuid;

use super::ApiError;
use super::extractors::Caller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/donations", post(create_donation))
        .route("/donations/mine", get(my_donations))
        .route("/donations/available/{donation_type}", get(available_donations))
        .route("/donations/{donation_id}", get(get_donation))
        .route("/donations/{donation_id}/requests", get(donation_requests))
        .route("/donations/{donation_id}/claim", post(claim_donation))
        .route("/donations/{donation_id}/withdraw", post(withdraw_donation))
}

async fn create_donation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<CreateDonation>,
) -> Result<(StatusCode, Json<DonationResponse>), ApiError> {
    let donation = state.api.create_donation(&caller, body).await?;
    Ok((StatusCode::CREATED, Json((&donation).into())))
}

async fn my_donations(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<DonationResponse>>, ApiError> {
    let donations = state.api.my_donations(&caller).await?;
    Ok(Json(donations.iter().map(Into::into).collect()))
}

async fn available_donations(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(donation_type): Path<DonationType>,
) -> Result<Json<Vec<DonationResponse>>, ApiError> {
    let donations = state.api.list_available(&caller, donation_type).await?;
    Ok(Json(donations.iter().map(Into::into).collect()))
}

async fn get_donation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(donation_id): Path<Uuid>,
) -> Result<Json<DonationResponse>, ApiError> {
    let donation = state.api.get_donation(&caller, donation_id).await?;
    Ok(Json((&donation).into()))
}

async fn donation_requests(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(donation_id): Path<Uuid>,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    let requests = state.api.donation_requests(&caller, donation_id).await?;
    Ok(Json(requests.iter().map(Into::into).collect()))
}

/// `POST /donations/{donation_id}/claim`
///
/// Exactly one of any number of concurrent claims succeeds; the rest get
/// `409 ALREADY_CLAIMED`.
async fn claim_donation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(donation_id): Path<Uuid>,
    Json(body): Json<ClaimDonation>,
) -> Result<(StatusCode, Json<RequestResponse>), ApiError> {
    let request = state.api.claim_donation(&caller, donation_id, body).await?;
    Ok((StatusCode::CREATED, Json((&request).into())))
}

async fn withdraw_donation(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(donation_id): Path<Uuid>,
) -> Result<Json<DonationResponse>, ApiError> {
    let donation = state.api.withdraw_donation(&caller, donation_id).await?;
    Ok(Json((&donation).into()))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestServer;
    use axum::http::{Method, StatusCode};
    use bite_sdk::objects::{DonationResponse, DonationStatus, ErrorResponse, RequestResponse};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_browse() {
        let server = TestServer::new();
        let donation_id = server.create_donation("HUMAN").await;

        let (status, available): (_, Vec<DonationResponse>) = server
            .json(&server.ngo, Method::GET, "/api/v1/donations/available/HUMAN", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].donation_id, donation_id);
        assert_eq!(available[0].status, DonationStatus::Available);

        let (_, dog_food): (_, Vec<DonationResponse>) = server
            .json(&server.ngo, Method::GET, "/api/v1/donations/available/DOG", None)
            .await;
        assert!(dog_food.is_empty());

        let (status, mine): (_, Vec<DonationResponse>) = server
            .json(&server.donor, Method::GET, "/api/v1/donations/mine", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn test_non_donor_cannot_create() {
        let server = TestServer::new();
        let (status, body): (_, ErrorResponse) = server
            .json(
                &server.ngo,
                Method::POST,
                "/api/v1/donations",
                Some(json!({
                    "food_name": "Bread",
                    "quantity": 3,
                    "donation_type": "HUMAN",
                    "expires_at": server.clock_now().unix_timestamp() + 3600,
                    "pickup": {"address": "1 Main St"}
                })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_claim_then_second_claim_conflicts() {
        let server = TestServer::new();
        let donation_id = server.create_donation("HUMAN").await;
        let uri = format!("/api/v1/donations/{donation_id}/claim");

        let (status, request): (_, RequestResponse) = server
            .json(
                &server.ngo,
                Method::POST,
                &uri,
                Some(json!({"delivery_address": "Shelter, 4th Cross"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request.donation_id, donation_id);
        assert_eq!(request.pickup_address.as_deref(), Some("12 MG Road"));

        let (status, body): (_, ErrorResponse) = server
            .json(&server.volunteer, Method::POST, &uri, Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.code, "ALREADY_CLAIMED");
        assert!(!body.retryable);

        let (_, donation): (_, DonationResponse) = server
            .json(
                &server.donor,
                Method::GET,
                &format!("/api/v1/donations/{donation_id}"),
                None,
            )
            .await;
        assert_eq!(donation.status, DonationStatus::Requested);

        let (status, claims): (_, Vec<RequestResponse>) = server
            .json(
                &server.donor,
                Method::GET,
                &format!("/api/v1/donations/{donation_id}/requests"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(claims.len(), 1);
    }

    #[tokio::test]
    async fn test_unapproved_claim_is_forbidden() {
        let server = TestServer::new();
        let donation_id = server.create_donation("HUMAN").await;
        let (status, body): (_, ErrorResponse) = server
            .json(
                &server.unapproved_needy,
                Method::POST,
                &format!("/api/v1/donations/{donation_id}/claim"),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "ACTOR_NOT_ELIGIBLE");
    }

    #[tokio::test]
    async fn test_expired_claim_is_gone() {
        let server = TestServer::new();
        let donation_id = server.create_donation("HUMAN").await;
        server.clock.advance(time::Duration::hours(3));
        let (status, body): (_, ErrorResponse) = server
            .json(
                &server.ngo,
                Method::POST,
                &format!("/api/v1/donations/{donation_id}/claim"),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body.code, "DONATION_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_withdraw() {
        let server = TestServer::new();
        let donation_id = server.create_donation("COMPOST").await;
        let (status, donation): (_, DonationResponse) = server
            .json(
                &server.donor,
                Method::POST,
                &format!("/api/v1/donations/{donation_id}/withdraw"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(donation.status, DonationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_unknown_donation_is_not_found() {
        let server = TestServer::new();
        let (status, body): (_, ErrorResponse) = server
            .json(
                &server.ngo,
                Method::GET,
                &format!("/api/v1/donations/{}", uuid::Uuid::now_v7()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "NOT_FOUND");
    }
}
