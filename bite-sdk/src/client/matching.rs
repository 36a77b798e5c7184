//! Matching API client.
//!
//! Each request carries the gateway identity headers, re-signed on every
//! call so the timestamp stays fresh.

use reqwest::{Client, Method, RequestBuilder};
use url::Url;
use uuid::Uuid;

use super::tracking::TrackingStream;
use super::{ClientError, parse_response};
use crate::objects::{
    AdvanceRequestStatus, ClaimDonation, CreateDonation, DonationResponse, DonationType,
    PublishSample, RequestResponse, RequestStatus, TrackingSampleResponse,
};
use crate::signature::{IDENTITY_HEADER, Identity, SIGNATURE_HEADER, sign_identity};

/// Typed HTTP client for the **Matching API**, acting as one identity.
#[derive(Debug, Clone)]
pub struct MatchingClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
    identity: Identity,
}

impl MatchingClient {
    /// Create a new `MatchingClient`.
    ///
    /// * `base_url` – root URL of the engine.
    /// * `gateway_secret` – the HMAC secret shared with the engine.
    /// * `identity` – the caller every request is made as.
    pub fn new(base_url: Url, gateway_secret: impl Into<Vec<u8>>, identity: Identity) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: gateway_secret.into(),
            identity,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.base_url.join(path)?;
        let signature = sign_identity(&self.identity, &self.secret);
        Ok(self
            .http
            .request(method, url)
            .header(IDENTITY_HEADER, self.identity.to_header())
            .header(SIGNATURE_HEADER, signature))
    }

    // -- Donations ----------------------------------------------------------

    /// `POST /api/v1/donations`
    pub async fn create_donation(
        &self,
        donation: &CreateDonation,
    ) -> Result<DonationResponse, ClientError> {
        let resp = self
            .request(Method::POST, "/api/v1/donations")?
            .json(donation)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/donations/available/{type}`
    pub async fn available_donations(
        &self,
        donation_type: DonationType,
    ) -> Result<Vec<DonationResponse>, ClientError> {
        let segment = match donation_type {
            DonationType::Human => "HUMAN",
            DonationType::Dog => "DOG",
            DonationType::Compost => "COMPOST",
        };
        let resp = self
            .request(
                Method::GET,
                &format!("/api/v1/donations/available/{segment}"),
            )?
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/donations/{donation_id}`
    pub async fn get_donation(&self, donation_id: Uuid) -> Result<DonationResponse, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/v1/donations/{donation_id}"))?
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/donations/{donation_id}/claim`
    pub async fn claim_donation(
        &self,
        donation_id: Uuid,
        claim: &ClaimDonation,
    ) -> Result<RequestResponse, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/v1/donations/{donation_id}/claim"),
            )?
            .json(claim)
            .send()
            .await?;
        parse_response(resp).await
    }

    // -- Requests -----------------------------------------------------------

    /// `GET /api/v1/requests/open`
    pub async fn open_requests(&self) -> Result<Vec<RequestResponse>, ClientError> {
        let resp = self
            .request(Method::GET, "/api/v1/requests/open")?
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/requests/{request_id}/accept`
    pub async fn accept_request(&self, request_id: Uuid) -> Result<RequestResponse, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/v1/requests/{request_id}/accept"),
            )?
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/requests/{request_id}/status`
    pub async fn advance_status(
        &self,
        request_id: Uuid,
        status: RequestStatus,
    ) -> Result<RequestResponse, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/v1/requests/{request_id}/status"),
            )?
            .json(&AdvanceRequestStatus { status })
            .send()
            .await?;
        parse_response(resp).await
    }

    // -- Tracking -----------------------------------------------------------

    /// `POST /api/v1/requests/{request_id}/tracking`
    pub async fn publish_sample(
        &self,
        request_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> Result<TrackingSampleResponse, ClientError> {
        let resp = self
            .request(
                Method::POST,
                &format!("/api/v1/requests/{request_id}/tracking"),
            )?
            .json(&PublishSample {
                latitude,
                longitude,
            })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/requests/{request_id}/tracking/latest`
    pub async fn latest_sample(
        &self,
        request_id: Uuid,
    ) -> Result<Option<TrackingSampleResponse>, ClientError> {
        let resp = self
            .request(
                Method::GET,
                &format!("/api/v1/requests/{request_id}/tracking/latest"),
            )?
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/requests/{request_id}/tracking/ws`
    pub async fn subscribe_tracking(&self, request_id: Uuid) -> Result<TrackingStream, ClientError> {
        let mut url = self
            .base_url
            .join(&format!("/api/v1/requests/{request_id}/tracking/ws"))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Url(url::ParseError::RelativeUrlWithoutBase))?;
        let signature = sign_identity(&self.identity, &self.secret);
        TrackingStream::connect(url, &self.identity.to_header(), &signature).await
    }
}
