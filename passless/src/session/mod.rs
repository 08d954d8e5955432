//! Session issuance: signed access tokens, refresh token bookkeeping and the
//! MFA hand-off.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::digest;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::directory::{User, UserDirectory, UserUpdate};
use crate::error::AuthError;
use crate::secret::{Ticket, TicketKind};
use crate::utils::{base64url_encode, gen_random_string};

const REFRESH_TOKEN_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub roles: Vec<String>,
    #[serde(rename = "defaultRole")]
    pub default_role: String,
    #[serde(rename = "isAnonymous")]
    pub is_anonymous: bool,
}

/// User fields safe to return to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    pub locale: String,
    pub default_role: String,
    pub roles: Vec<String>,
    pub email_verified: bool,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            locale: user.locale.clone(),
            default_role: user.default_role.clone(),
            roles: user.allowed_roles.clone(),
            email_verified: user.email_verified,
            is_anonymous: user.is_anonymous,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub access_token_expires_in: u64,
    pub refresh_token: String,
    pub refresh_token_id: String,
    pub user: PublicUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaChallenge {
    pub ticket: String,
}

/// Outcome of a completed sign-in step. Exactly one of the fields is
/// populated, except for pending-verification sign-ups where both are null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInResponse {
    pub session: Option<Session>,
    pub mfa: Option<MfaChallenge>,
}

impl SignInResponse {
    pub(crate) fn pending() -> Self {
        Self {
            session: None,
            mfa: None,
        }
    }
}

struct StoredRefreshToken {
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// Issues sessions once a flow has fully authenticated a user.
pub struct SessionIssuer {
    config: Arc<AuthConfig>,
    directory: Arc<dyn UserDirectory>,
    // Keyed by SHA-256 of the token, so a directory dump never yields a
    // usable refresh token.
    refresh_tokens: Mutex<HashMap<String, StoredRefreshToken>>,
}

impl SessionIssuer {
    pub fn new(config: Arc<AuthConfig>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            config,
            directory,
            refresh_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a session for a user who just completed a flow's final step.
    ///
    /// The disabled flag is re-read here so an account disabled mid-ceremony
    /// cannot ride a stale row into a session. With `check_mfa` set, a user
    /// with an active TOTP method gets an `mfaTotp:` challenge ticket
    /// instead of tokens.
    pub async fn issue(&self, user_id: &str, check_mfa: bool) -> Result<SignInResponse, AuthError> {
        let user = self
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Internal("user record vanished".to_string()))?;
        if user.disabled {
            warn!(user_id, "refusing session for disabled user");
            return Err(AuthError::DisabledUser);
        }

        if check_mfa && user.active_mfa_type.as_deref() == Some("totp") {
            let ticket = Ticket::issue(
                TicketKind::MfaTotp,
                Duration::seconds(i64::from(self.config.mfa_ticket_ttl)),
            );
            let value = ticket.value.clone();
            self.directory
                .update_user(
                    user_id,
                    UserUpdate {
                        ticket: Some(Some(ticket)),
                        ..Default::default()
                    },
                )
                .await?;
            debug!(user_id, "MFA hand-off, challenge ticket issued");
            return Ok(SignInResponse {
                session: None,
                mfa: Some(MfaChallenge { ticket: value }),
            });
        }

        let now = Utc::now();
        let claims = AccessClaims {
            sub: user.id.clone(),
            iss: self.config.jwt_issuer.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + i64::from(self.config.access_token_expires_in),
            roles: user.allowed_roles.clone(),
            default_role: user.default_role.clone(),
            is_anonymous: user.is_anonymous,
        };
        let access_token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("failed to sign access token: {e}")))?;

        let refresh_token = gen_random_string(REFRESH_TOKEN_LEN)?;
        let refresh_token_id = Uuid::new_v4().to_string();
        {
            let mut tokens = self.refresh_tokens.lock().await;
            // Expired entries are dead weight; drop them while we hold the
            // lock anyway.
            tokens.retain(|_, stored| stored.expires_at > now);
            tokens.insert(
                hash_refresh_token(&refresh_token),
                StoredRefreshToken {
                    user_id: user.id.clone(),
                    expires_at: now
                        + Duration::seconds(i64::from(self.config.refresh_token_expires_in)),
                },
            );
        }

        debug!(user_id, "session issued");
        Ok(SignInResponse {
            session: Some(Session {
                access_token,
                access_token_expires_in: u64::from(self.config.access_token_expires_in),
                refresh_token,
                refresh_token_id,
                user: PublicUser::from(&user),
            }),
            mfa: None,
        })
    }

    /// Looks up a refresh token, returning the owning user id while it is
    /// still live.
    pub async fn refresh_token_owner(&self, refresh_token: &str) -> Option<String> {
        let tokens = self.refresh_tokens.lock().await;
        let stored = tokens.get(&hash_refresh_token(refresh_token))?;
        if stored.expires_at <= Utc::now() {
            return None;
        }
        Some(stored.user_id.clone())
    }
}

fn hash_refresh_token(token: &str) -> String {
    base64url_encode(digest::digest(&digest::SHA256, token.as_bytes()))
}

/// Decodes and validates an access token, for bearer-authenticated routes.
pub fn verify_access_token(config: &AuthConfig, token: &str) -> Result<AccessClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.jwt_issuer]);
    let data = jsonwebtoken::decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        debug!("access token rejected: {e}");
        AuthError::InvalidRequest
    })?;
    Ok(data.claims)
}
