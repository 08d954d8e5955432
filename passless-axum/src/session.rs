use axum::extract::FromRequestParts;
use http::header::AUTHORIZATION;
use http::request::Parts;
use passless::{AccessClaims, AuthError, verify_access_token};

use crate::error::ApiError;
use crate::state::AuthState;

/// Extractor for bearer-authenticated routes. Rejects with 401 when the
/// `Authorization` header is missing, malformed or carries a bad token.
pub struct AuthUser {
    pub claims: AccessClaims,
}

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }
}

impl FromRequestParts<AuthState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AuthState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError(AuthError::InvalidRequest))?;
        let claims = verify_access_token(&state.config, token)?;
        Ok(Self { claims })
    }
}
