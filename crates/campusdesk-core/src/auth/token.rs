//! Bearer credential decoding and validation.
//!
//! Credentials are JWTs. Only the payload is decoded; the signature is the
//! backend's concern. Nothing here panics or returns an error to the
//! session façade: a token that cannot be decoded is simply invalid.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token is not in header.payload.signature form")]
    Malformed,

    #[error("Token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Token claims could not be parsed: {0}")]
    Claims(#[from] serde_json::Error),
}

/// The claims the session core reads from a credential
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Milliseconds from `now` until expiry; zero or negative once expired
    pub fn millis_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_mul(1000).saturating_sub(now.timestamp_millis())
    }
}

/// Decode the payload claims of a credential
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    if payload.is_empty() {
        return Err(TokenError::Malformed);
    }

    // Some issuers pad their segments; the engine does not accept padding
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// True if the credential decodes and its expiry is after `now`
pub fn is_valid_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.millis_until_expiry(now) > 0,
        Err(_) => false,
    }
}

/// True if the credential decodes and has not expired yet
pub fn is_valid(token: &str) -> bool {
    is_valid_at(token, Utc::now())
}

/// Build an unsigned credential with the given expiry.
/// Used by tests across the crate; the signature segment is a placeholder.
#[cfg(test)]
pub(crate) fn test_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"sub":"u1"}}"#, exp));
    let signature = URL_SAFE_NO_PAD.encode("fake-signature");
    format!("{}.{}.{}", header, payload, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_decode_claims() {
        let token = test_token(1_900_000_000);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, 1_900_000_000);
        assert_eq!(claims.sub.as_deref(), Some("u1"));
        assert_eq!(claims.iat, None);
        assert_eq!(claims.expires_at().unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_decode_claims_malformed() {
        assert!(matches!(decode_claims(""), Err(TokenError::Malformed)));
        assert!(matches!(decode_claims("abc"), Err(TokenError::Malformed)));
        assert!(matches!(decode_claims("a..c"), Err(TokenError::Malformed)));
        assert!(matches!(decode_claims("a.b.c.d"), Err(TokenError::Malformed)));
        assert!(matches!(decode_claims("a.!!!.c"), Err(TokenError::Encoding(_))));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(decode_claims(&not_json), Err(TokenError::Claims(_))));

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"x"}"#));
        assert!(matches!(decode_claims(&no_exp), Err(TokenError::Claims(_))));
    }

    #[test]
    fn test_is_valid_at_boundary() {
        let now = Utc.timestamp_opt(1_800_000_000, 0).unwrap();

        assert!(is_valid_at(&test_token(1_800_000_001), now));
        // Expiry exactly at `now` is already expired
        assert!(!is_valid_at(&test_token(1_800_000_000), now));
        assert!(!is_valid_at(&test_token(1_799_999_999), now));
    }

    #[test]
    fn test_is_valid_uses_current_time() {
        let future = (Utc::now() + Duration::hours(1)).timestamp();
        let past = (Utc::now() - Duration::hours(1)).timestamp();
        assert!(is_valid(&test_token(future)));
        assert!(!is_valid(&test_token(past)));
        assert!(!is_valid("garbage"));
    }

    #[test]
    fn test_millis_until_expiry() {
        let claims = decode_claims(&test_token(1_000)).unwrap();
        let now = Utc.timestamp_millis_opt(998_500).unwrap();
        assert_eq!(claims.millis_until_expiry(now), 1_500);
    }

    #[test]
    fn test_padded_payload_accepted() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp": 1900000000}"#);
        assert!(payload.ends_with('='));
        let token = format!("h.{}.s", payload);
        assert_eq!(decode_claims(&token).unwrap().exp, 1_900_000_000);
    }
}
