// =============================================================================
// Request Signing — HMAC-SHA256 caller authentication
// =============================================================================
//
// Every mutating request carries three headers:
//
//   X-Ledger-Identity   caller identity (must be in the keyring)
//   X-Ledger-Timestamp  unix seconds at signing time
//   X-Ledger-Signature  hex(HMAC-SHA256(secret, canonical))
//
// where canonical = "{METHOD}\n{PATH}\n{TIMESTAMP}\n{BODY}".
//
// A request is rejected with 401 when a header is missing, the identity is
// unknown, the timestamp is outside the allowed skew, the signature does not
// match, or the same signature was already accepted inside the skew window.
// The MAC comparison is constant time (`Mac::verify_slice`).
//
// Authentication only establishes WHO is calling. Whether that identity may
// perform the operation is decided by the ledger.
// =============================================================================

use axum::{
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::app_state::AppState;
use crate::types::Identity;

type HmacSha256 = Hmac<Sha256>;

pub const IDENTITY_HEADER: &str = "x-ledger-identity";
pub const TIMESTAMP_HEADER: &str = "x-ledger-timestamp";
pub const SIGNATURE_HEADER: &str = "x-ledger-signature";

/// Rejection returned when authentication fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    message: &'static str,
}

impl AuthError {
    fn new(message: &'static str) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &'static str {
        self.message
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": "UNAUTHENTICATED",
            "message": self.message(),
            "retryable": false,
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

fn canonical(method: &Method, path: &str, timestamp: u64, body: &[u8]) -> Vec<u8> {
    let mut msg = format!("{}\n{}\n{}\n", method.as_str(), path, timestamp).into_bytes();
    msg.extend_from_slice(body);
    msg
}

/// Hex signature for a request. Used by clients and tests.
pub fn sign_request(secret: &str, method: &Method, path: &str, timestamp: u64, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(&canonical(method, path, timestamp, body));
    hex::encode(mac.finalize().into_bytes())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Authenticate a request and return the caller identity.
pub fn authenticate(
    state: &AppState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Identity, AuthError> {
    let (Some(identity), Some(timestamp), Some(signature)) = (
        header(headers, IDENTITY_HEADER),
        header(headers, TIMESTAMP_HEADER),
        header(headers, SIGNATURE_HEADER),
    ) else {
        warn!(path, "request without signing headers");
        return Err(AuthError::new("Missing signing headers"));
    };

    let identity = Identity::new(identity);
    let Some(secret) = state.secret_for(&identity) else {
        warn!(path, caller = %identity, "unknown identity");
        return Err(AuthError::new("Unknown identity"));
    };

    let Ok(timestamp) = timestamp.parse::<u64>() else {
        return Err(AuthError::new("Malformed timestamp"));
    };
    let now = state.clock.now();
    if now.abs_diff(timestamp) > state.max_clock_skew_secs {
        warn!(path, caller = %identity, timestamp, now, "request timestamp outside allowed skew");
        return Err(AuthError::new("Stale or future timestamp"));
    }

    let Ok(provided) = hex::decode(signature) else {
        return Err(AuthError::new("Malformed signature"));
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::new("Server key misconfigured"))?;
    mac.update(&canonical(method, path, timestamp, body));
    if mac.verify_slice(&provided).is_err() {
        warn!(path, caller = %identity, "invalid request signature");
        return Err(AuthError::new("Invalid signature"));
    }

    if !state.replay_guard.check_and_record(
        &signature.to_ascii_lowercase(),
        timestamp,
        now,
        state.max_clock_skew_secs,
    ) {
        warn!(path, caller = %identity, "replayed request rejected");
        return Err(AuthError::new("Replayed request"));
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;

    use super::*;
    use crate::ledger::clock::ManualClock;
    use crate::ledger::{Clock, TreasuryLedger};
    use crate::settings::ServiceSettings;

    fn state(now: u64) -> AppState {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at(now));
        let mut settings = ServiceSettings::default();
        settings.keys.insert("GADMIN".into(), "admin-secret".into());
        AppState::new(Arc::new(TreasuryLedger::in_memory(clock.clone())), clock, &settings)
    }

    fn signed(identity: &str, secret: &str, ts: u64, body: &[u8]) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(IDENTITY_HEADER, HeaderValue::from_str(identity).unwrap());
        h.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&ts.to_string()).unwrap());
        let sig = sign_request(secret, &Method::POST, "/api/v1/halt", ts, body);
        h.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        h
    }

    #[test]
    fn valid_signature_yields_identity() {
        let state = state(1_000);
        let headers = signed("GADMIN", "admin-secret", 1_000, b"{}");
        let id = authenticate(&state, &Method::POST, "/api/v1/halt", &headers, b"{}").unwrap();
        assert_eq!(id, Identity::new("GADMIN"));
    }

    #[test]
    fn tampered_body_or_path_fails() {
        let state = state(1_000);
        let headers = signed("GADMIN", "admin-secret", 1_000, b"{}");
        assert!(authenticate(&state, &Method::POST, "/api/v1/halt", &headers, b"{\"x\":1}").is_err());
        assert!(authenticate(&state, &Method::POST, "/api/v1/resume", &headers, b"{}").is_err());
    }

    #[test]
    fn wrong_secret_and_unknown_identity_fail() {
        let state = state(1_000);
        let wrong = signed("GADMIN", "guess", 1_000, b"");
        assert_eq!(
            authenticate(&state, &Method::POST, "/api/v1/halt", &wrong, b"").unwrap_err().message(),
            "Invalid signature"
        );
        let unknown = signed("GEVE", "admin-secret", 1_000, b"");
        assert_eq!(
            authenticate(&state, &Method::POST, "/api/v1/halt", &unknown, b"").unwrap_err().message(),
            "Unknown identity"
        );
    }

    #[test]
    fn stale_timestamp_fails() {
        let state = state(1_000);
        let headers = signed("GADMIN", "admin-secret", 900, b"");
        assert_eq!(
            authenticate(&state, &Method::POST, "/api/v1/halt", &headers, b"").unwrap_err().message(),
            "Stale or future timestamp"
        );
    }

    #[test]
    fn replay_is_rejected() {
        let state = state(1_000);
        let headers = signed("GADMIN", "admin-secret", 1_000, b"");
        assert!(authenticate(&state, &Method::POST, "/api/v1/halt", &headers, b"").is_ok());
        assert_eq!(
            authenticate(&state, &Method::POST, "/api/v1/halt", &headers, b"").unwrap_err().message(),
            "Replayed request"
        );
    }

    #[test]
    fn missing_headers_fail() {
        let state = state(1_000);
        assert!(authenticate(&state, &Method::POST, "/api/v1/halt", &HeaderMap::new(), b"").is_err());
    }
}
