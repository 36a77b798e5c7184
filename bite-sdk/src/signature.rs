//! Identity assertion signing and verification.
//!
//! Authentication happens upstream. The gateway attaches the validated
//! `(user_id, role)` pair to every call and signs it with a secret shared
//! with the engine:
//!
//! ```text
//! Bite-Identity:  {user_id}:{role}
//! Bite-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The signature is `HMAC-SHA256("{identity}.{timestamp}", gateway_secret)`.

use uuid::Uuid;

use crate::objects::Role;

/// Header carrying the asserted identity.
pub const IDENTITY_HEADER: &str = "Bite-Identity";

/// Header carrying the HMAC over the identity.
pub const SIGNATURE_HEADER: &str = "Bite-Signature";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

/// A caller identity as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Format the `Bite-Identity` header value.
    pub fn to_header(&self) -> String {
        format!("{}:{}", self.user_id, self.role)
    }

    /// Parse a `Bite-Identity` header value.
    pub fn parse_header(value: &str) -> Result<Self, SignatureError> {
        let (user_id, role) = value.split_once(':').ok_or(SignatureError::InvalidFormat)?;
        let user_id = Uuid::parse_str(user_id).map_err(|_| SignatureError::InvalidFormat)?;
        let role = role.parse().map_err(|_| SignatureError::InvalidFormat)?;
        Ok(Self { user_id, role })
    }
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Sign an identity with the current time.
///
/// Returns the formatted `Bite-Signature` header value.
pub fn sign_identity(identity: &Identity, key: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_identity_at(identity, timestamp, key)
}

/// Sign an identity with an explicit timestamp.
pub fn sign_identity_at(identity: &Identity, timestamp: i64, key: &[u8]) -> String {
    let data = format!("{}.{timestamp}", identity.to_header());
    let sig = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
    );
    format_signature_header(timestamp, sig.as_ref())
}

/// Verify the identity and signature headers, returning the trusted identity.
pub fn verify_identity(
    identity_header: &str,
    signature_header: &str,
    key: &[u8],
) -> Result<Identity, SignatureError> {
    let (timestamp, signature) = parse_signature_header(signature_header)?;
    let data = format!("{identity_header}.{timestamp}");
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key),
        data.as_bytes(),
        &signature,
    )?;
    check_timestamp(timestamp)?;
    Identity::parse_header(identity_header)
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `Bite-Signature` header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"gateway-secret";

    fn volunteer() -> Identity {
        Identity::new(Uuid::now_v7(), Role::Volunteer)
    }

    #[test]
    fn signed_identity_verifies() {
        let identity = volunteer();
        let signature = sign_identity(&identity, SECRET);
        let verified = verify_identity(&identity.to_header(), &signature, SECRET).unwrap();
        assert_eq!(verified, identity);
    }

    #[test]
    fn escalated_role_is_rejected() {
        let identity = volunteer();
        let signature = sign_identity(&identity, SECRET);
        let forged = Identity::new(identity.user_id, Role::Admin).to_header();
        assert!(matches!(
            verify_identity(&forged, &signature, SECRET),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let identity = volunteer();
        let signature = sign_identity(&identity, b"another-secret");
        assert!(verify_identity(&identity.to_header(), &signature, SECRET).is_err());
    }

    #[test]
    fn stale_signature_is_rejected() {
        let identity = volunteer();
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 10;
        let signature = sign_identity_at(&identity, old, SECRET);
        assert!(matches!(
            verify_identity(&identity.to_header(), &signature, SECRET),
            Err(SignatureError::Expired)
        ));
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(matches!(
            Identity::parse_header("not-a-uuid:DONOR"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("no-dot-here"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("1700000000.!!!"),
            Err(SignatureError::InvalidBase64)
        ));
    }
}
