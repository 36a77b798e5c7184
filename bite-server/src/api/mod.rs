//! HTTP API under `/api/v1`.
//!
//! Every endpoint takes the caller identity from the gateway-signed
//! `Bite-Identity` / `Bite-Signature` headers (see [`extractors::Caller`])
//! and hands it to the [`MatchingApi`](bite_core::matching::MatchingApi),
//! which decides what the caller may do.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bite_core::matching::MatchingError;
use bite_sdk::objects::ErrorResponse;

use crate::state::AppState;

mod admin;
mod donations;
mod extractors;
mod requests;
mod tracking;

/// Build the `/api/v1` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(donations::router())
        .merge(requests::router())
        .merge(tracking::router())
        .merge(admin::router())
}

/// A [`MatchingError`] on its way to the wire.
#[derive(Debug)]
pub(crate) struct ApiError(MatchingError);

impl From<MatchingError> for ApiError {
    fn from(err: MatchingError) -> Self {
        Self(err)
    }
}

pub(crate) fn status_code(err: &MatchingError) -> StatusCode {
    match err {
        MatchingError::Validation(_) => StatusCode::BAD_REQUEST,
        MatchingError::Forbidden(_) | MatchingError::ActorNotEligible => StatusCode::FORBIDDEN,
        MatchingError::NotFound(_) => StatusCode::NOT_FOUND,
        MatchingError::AlreadyClaimed
        | MatchingError::AlreadyAssigned
        | MatchingError::InvalidTransition(_) => StatusCode::CONFLICT,
        MatchingError::DonationUnavailable | MatchingError::TrackingClosed => StatusCode::GONE,
        MatchingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(err) = self;
        let status = status_code(&err);
        if let MatchingError::Unavailable(cause) = &err {
            tracing::error!(cause = %cause, "Matching API unavailable");
        }
        let body = ErrorResponse {
            code: err.code().to_owned(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! An in-memory server with a few approved users and signed requests.

    use crate::config::runtime::AuthConfig;
    use crate::server::build_router;
    use crate::state::AppState;
    use axum::Router;
    use axum::body::{Body, Bytes};
    use axum::http::{Method, Request, header};
    use bite_core::clock::ManualClock;
    use bite_core::config::HubConfig;
    use bite_core::directory::StaticDirectory;
    use bite_core::events::engine_event_channel;
    use bite_core::matching::MatchingApi;
    use bite_core::store::MemoryStore;
    use bite_core::tracking::TrackingHub;
    use bite_sdk::objects::Role;
    use bite_sdk::signature::{IDENTITY_HEADER, Identity, SIGNATURE_HEADER, sign_identity};
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tokio::sync::watch;
    use tower::ServiceExt;
    use uuid::Uuid;

    pub const SECRET: &[u8] = b"gateway-test-secret";

    pub struct TestServer {
        pub router: Router,
        pub clock: Arc<ManualClock>,
        pub donor: Identity,
        pub ngo: Identity,
        pub volunteer: Identity,
        pub admin: Identity,
        pub unapproved_needy: Identity,
        _shutdown: watch::Sender<bool>,
    }

    impl TestServer {
        pub fn new() -> Self {
            let donor = Identity::new(Uuid::now_v7(), Role::Donor);
            let ngo = Identity::new(Uuid::now_v7(), Role::Ngo);
            let volunteer = Identity::new(Uuid::now_v7(), Role::Volunteer);
            let admin = Identity::new(Uuid::now_v7(), Role::Admin);
            let unapproved_needy = Identity::new(Uuid::now_v7(), Role::Needy);
            let directory = StaticDirectory::new()
                .approve(donor.user_id)
                .approve(ngo.user_id)
                .approve(volunteer.user_id)
                .approve(admin.user_id);

            let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
            let (events, _) = engine_event_channel();
            let api = Arc::new(MatchingApi::new(
                Arc::new(MemoryStore::new()),
                Arc::new(directory),
                Arc::new(TrackingHub::new(HubConfig::default())),
                clock.clone(),
                events.clone(),
            ));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let state = AppState::new(
                api,
                events,
                AuthConfig::new(SECRET.into()),
                shutdown_rx,
            );

            Self {
                router: build_router(state),
                clock,
                donor,
                ngo,
                volunteer,
                admin,
                unapproved_needy,
                _shutdown: shutdown_tx,
            }
        }

        /// Send a request signed as `caller`, returning status and raw body.
        pub async fn send(
            &self,
            caller: &Identity,
            method: Method,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (axum::http::StatusCode, Bytes) {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(IDENTITY_HEADER, caller.to_header())
                .header(SIGNATURE_HEADER, sign_identity(caller, SECRET));
            let body = match body {
                Some(json) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
                .await
                .unwrap();
            (status, bytes)
        }

        pub async fn json<T: DeserializeOwned>(
            &self,
            caller: &Identity,
            method: Method,
            uri: &str,
            body: Option<serde_json::Value>,
        ) -> (axum::http::StatusCode, T) {
            let (status, bytes) = self.send(caller, method, uri, body).await;
            let parsed = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                panic!(
                    "unexpected body for {uri} ({status}): {e}: {}",
                    String::from_utf8_lossy(&bytes)
                )
            });
            (status, parsed)
        }

        /// Post a donation expiring in two hours and return its id.
        pub async fn create_donation(&self, donation_type: &str) -> Uuid {
            let expires_at = (self.clock_now() + time::Duration::hours(2)).unix_timestamp();
            let (status, body): (_, serde_json::Value) = self
                .json(
                    &self.donor,
                    Method::POST,
                    "/api/v1/donations",
                    Some(serde_json::json!({
                        "food_name": "Vegetable biryani",
                        "description": "Packed this evening",
                        "quantity": 12,
                        "donation_type": donation_type,
                        "expires_at": expires_at,
                        "pickup": {"address": "12 MG Road", "latitude": 12.97, "longitude": 77.59}
                    })),
                )
                .await;
            assert_eq!(status, axum::http::StatusCode::CREATED, "{body}");
            body["donation_id"].as_str().unwrap().parse().unwrap()
        }

        /// Serve the router on an ephemeral local port and return its base URL.
        pub async fn serve(&self) -> url::Url {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let router = self.router.clone();
            tokio::spawn(async move { axum::serve(listener, router).await });
            url::Url::parse(&format!("http://{addr}")).unwrap()
        }

        pub fn clock_now(&self) -> OffsetDateTime {
            use bite_core::clock::Clock;
            self.clock.now()
        }
    }
}
