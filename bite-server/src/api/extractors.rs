//! Caller authentication.
//!
//! The gateway authenticates end users and forwards their identity in
//! `Bite-Identity`, signed in `Bite-Signature`. [`Caller`] verifies the pair
//! against the configured gateway secret.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use bite_sdk::objects::ErrorResponse;
use bite_sdk::signature::{
    self, IDENTITY_HEADER, Identity, SIGNATURE_HEADER, SignatureError,
};

use crate::state::AppState;

/// The verified identity of whoever is calling.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

#[derive(Debug, thiserror::Error)]
pub enum CallerError {
    #[error("missing Bite-Identity header")]
    MissingIdentity,
    #[error("missing Bite-Signature header")]
    MissingSignature,
    #[error("invalid identity or signature header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidBase64,
    #[error("signature verification failed")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<SignatureError> for CallerError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::SignatureMismatch => Self::SignatureMismatch,
            SignatureError::Expired => Self::Expired,
        }
    }
}

impl IntoResponse for CallerError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            CallerError::MissingIdentity | CallerError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED")
            }
            CallerError::InvalidHeader | CallerError::InvalidBase64 => {
                (StatusCode::BAD_REQUEST, "BAD_AUTH_HEADER")
            }
            CallerError::SignatureMismatch | CallerError::Expired => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED")
            }
        };
        let body = ErrorResponse {
            code: code.to_owned(),
            message: self.to_string(),
            retryable: false,
        };
        (status, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = CallerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity_header = parts
            .headers
            .get(IDENTITY_HEADER)
            .ok_or(CallerError::MissingIdentity)?
            .to_str()
            .map_err(|_| CallerError::InvalidHeader)?;
        let signature_header = parts
            .headers
            .get(SIGNATURE_HEADER)
            .ok_or(CallerError::MissingSignature)?
            .to_str()
            .map_err(|_| CallerError::InvalidHeader)?;

        let auth = state.auth.read().await;
        let identity =
            signature::verify_identity(identity_header, signature_header, auth.secret_bytes())?;
        drop(auth);

        Ok(Caller(identity))
    }
}
