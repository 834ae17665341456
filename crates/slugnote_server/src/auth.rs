//! Caller resolution for incoming requests.
//!
//! # Responsibility
//! - Read the owning session from the `session_id` cookie.
//! - Recognise admin sessions by a configured bearer token.
//!
//! # Invariants
//! - A missing or blank cookie yields an anonymous caller, never an error.
//! - An unconfigured admin token never grants admin.

use crate::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use slugnote_core::identity::session_id_from_cookie_header;
use slugnote_core::{Caller, SecretToken};
use std::convert::Infallible;
use std::sync::Arc;

/// Admin-session lookup backed by a shared secret.
#[derive(Debug, Clone)]
pub struct AdminGate {
    token: SecretToken,
}

impl AdminGate {
    pub fn new(token: SecretToken) -> Self {
        Self { token }
    }

    /// Whether the request carries `Authorization: Bearer <admin token>`.
    pub fn is_admin(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| self.token.verify(presented))
    }
}

/// Builds the caller for a request.
pub fn caller_from_headers(headers: &HeaderMap, admin: &AdminGate) -> Caller {
    let session_id = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(session_id_from_cookie_header);
    Caller {
        session_id,
        is_admin: admin.is_admin(headers),
    }
}

/// Extractor wrapper around [`Caller`].
#[derive(Debug, Clone)]
pub struct RequestCaller(pub Caller);

impl FromRequestParts<Arc<AppState>> for RequestCaller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(caller_from_headers(&parts.headers, &state.admin)))
    }
}

#[cfg(test)]
mod tests {
    use super::{caller_from_headers, AdminGate};
    use axum::http::header::{AUTHORIZATION, COOKIE};
    use axum::http::{HeaderMap, HeaderValue};
    use slugnote_core::{SecretToken, SessionId};

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn reads_session_cookie_among_others() {
        let gate = AdminGate::new(SecretToken::new(""));
        let caller = caller_from_headers(
            &headers(&[(COOKIE, "theme=dark; session_id=S1; lang=en")]),
            &gate,
        );
        assert_eq!(caller.session_id, Some(SessionId::new("S1")));
        assert!(!caller.is_admin);
    }

    #[test]
    fn admin_requires_matching_bearer_token() {
        let gate = AdminGate::new(SecretToken::new("root"));
        assert!(gate.is_admin(&headers(&[(AUTHORIZATION, "Bearer root")])));
        assert!(!gate.is_admin(&headers(&[(AUTHORIZATION, "Bearer nope")])));
        assert!(!gate.is_admin(&headers(&[(AUTHORIZATION, "root")])));

        let unset = AdminGate::new(SecretToken::new(""));
        assert!(!unset.is_admin(&headers(&[(AUTHORIZATION, "Bearer ")])));
    }

    #[test]
    fn missing_cookie_is_anonymous() {
        let gate = AdminGate::new(SecretToken::new("root"));
        let caller = caller_from_headers(&HeaderMap::new(), &gate);
        assert_eq!(caller.session_id, None);
    }
}
