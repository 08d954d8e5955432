//! WebAuthn sign-in, sign-up and add-credential flows. Ceremony
//! cryptography lives in the `webauthn` module; this layer owns user
//! resolution, challenge bookkeeping, counter policy and session hand-off.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::{
    LinkType, SignUpOptions, check_user, generate_link, resolve_signup_options, validate_email,
    validate_redirect_to,
};
use crate::challenge::ChallengeStore;
use crate::config::{AuthConfig, CounterPolicy};
use crate::delivery::{Emailer, TemplateData, TemplateName};
use crate::directory::{Authenticator, User, UserDirectory, UserUpdate};
use crate::error::AuthError;
use crate::secret::{Ticket, TicketKind};
use crate::session::{SessionIssuer, SignInResponse};
use crate::webauthn::{
    CreationOptions, CredentialDescriptor, RegisterCredential, RequestOptions, SignInCredential,
    UserEntity, creation_options, request_options, verify_assertion, verify_registration,
};

pub struct WebauthnFlow {
    config: Arc<AuthConfig>,
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Emailer>,
    sessions: Arc<SessionIssuer>,
    challenges: ChallengeStore,
}

impl WebauthnFlow {
    pub fn new(
        config: Arc<AuthConfig>,
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Emailer>,
        sessions: Arc<SessionIssuer>,
    ) -> Self {
        let challenges = ChallengeStore::new(directory.clone());
        Self {
            config,
            directory,
            mailer,
            sessions,
            challenges,
        }
    }

    /// Starts a sign-in ceremony for a known email. Unknown addresses get
    /// the same error as malformed ones.
    pub async fn signin_options(&self, email: &str) -> Result<RequestOptions, AuthError> {
        self.ensure_enabled()?;
        let email = validate_email(&self.config, email)?;
        let user = self
            .directory
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidEmailPassword)?;
        check_user(&self.config, &user)?;

        let allow_credentials = self
            .directory
            .authenticators_for_user(&user.id)
            .await?
            .into_iter()
            .map(|a| CredentialDescriptor {
                type_: "public-key".to_string(),
                id: a.credential_id,
            })
            .collect();
        let challenge = self.challenges.begin(&user.id).await?;
        Ok(request_options(&self.config, allow_credentials, challenge))
    }

    /// Completes a sign-in ceremony. The challenge is consumed before the
    /// assertion is checked, so a failed attempt cannot be retried against
    /// the same challenge.
    pub async fn signin_verify(
        &self,
        credential: &SignInCredential,
    ) -> Result<SignInResponse, AuthError> {
        self.ensure_enabled()?;
        let stored = self
            .directory
            .find_authenticator(&credential.id)
            .await?
            .ok_or_else(|| {
                debug!("assertion for unknown credential id");
                AuthError::InvalidRequest
            })?;
        if let Some(handle) = &credential.response.user_handle {
            if handle != &stored.user_id {
                warn!("assertion user handle does not match credential owner");
                return Err(AuthError::InvalidRequest);
            }
        }
        let user = self
            .directory
            .find_by_id(&stored.user_id)
            .await?
            .ok_or(AuthError::InvalidRequest)?;

        let challenge = self.challenges.consume(&user.id).await?;
        let new_counter = verify_assertion(&self.config, &challenge, credential, &stored)
            .map_err(|e| {
                warn!(user_id = %user.id, "assertion rejected: {e}");
                AuthError::InvalidRequest
            })?;
        self.reconcile_counter(&stored, new_counter).await?;

        check_user(&self.config, &user)?;
        self.sessions.issue(&user.id, true).await
    }

    /// Starts a sign-up ceremony: a placeholder user is created with the
    /// claimed email parked in `new_email` until the ceremony proves key
    /// possession.
    pub async fn signup_options(
        &self,
        email: &str,
        options: &SignUpOptions,
    ) -> Result<CreationOptions, AuthError> {
        self.ensure_enabled()?;
        if self.config.disable_signup {
            return Err(AuthError::SignupDisabled);
        }
        let email = validate_email(&self.config, email)?;
        if self.directory.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyInUse);
        }
        let resolved = resolve_signup_options(&self.config, &email, options)?;

        let mut user = User::new(None, resolved.display_name.clone());
        user.new_email = Some(email.clone());
        user.is_anonymous = true;
        user.locale = resolved.locale;
        user.default_role = resolved.default_role;
        user.allowed_roles = resolved.allowed_roles;
        user.disabled = self.config.disable_new_users;
        let user = self.directory.insert_user(user).await?;
        debug!(user_id = %user.id, "placeholder user created for sign-up ceremony");

        let challenge = self.challenges.begin(&user.id).await?;
        Ok(creation_options(
            &self.config,
            UserEntity {
                id: user.id,
                name: email,
                display_name: resolved.display_name,
            },
            Vec::new(),
            challenge,
        ))
    }

    /// Completes a sign-up ceremony for the placeholder user created by
    /// [`signup_options`](Self::signup_options).
    ///
    /// The claimed email is re-checked against the directory here: another
    /// sign-up may have finished first while this ceremony was in flight.
    pub async fn signup_verify(
        &self,
        user_id: &str,
        credential: &RegisterCredential,
        options: &SignUpOptions,
    ) -> Result<SignInResponse, AuthError> {
        self.ensure_enabled()?;
        let user = self
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidRequest)?;
        let claimed_email = user.new_email.clone().ok_or(AuthError::InvalidRequest)?;

        let challenge = self.challenges.consume(&user.id).await?;
        let key = verify_registration(&self.config, &challenge, credential).map_err(|e| {
            warn!(user_id = %user.id, "attestation rejected: {e}");
            AuthError::InvalidRequest
        })?;

        if let Some(other) = self.directory.find_by_email(&claimed_email).await? {
            if other.id != user.id {
                warn!(user_id = %user.id, "email claimed by a concurrent sign-up");
                return Err(AuthError::EmailAlreadyInUse);
            }
        }
        if user.disabled {
            return Err(AuthError::DisabledUser);
        }

        self.directory
            .add_authenticator(Authenticator {
                credential_id: key.credential_id,
                user_id: user.id.clone(),
                public_key: key.public_key,
                alg: key.alg as i32,
                counter: key.counter,
                nickname: None,
                created_at: Utc::now(),
            })
            .await?;
        self.directory
            .update_user(
                &user.id,
                UserUpdate {
                    email: Some(claimed_email.clone()),
                    new_email: Some(None),
                    is_anonymous: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        debug!(user_id = %user.id, "sign-up ceremony completed");

        if self.config.email_verification_required && !user.email_verified {
            self.send_verification_email(&user, &claimed_email, options)
                .await?;
            return Ok(SignInResponse::pending());
        }
        self.sessions.issue(&user.id, false).await
    }

    /// Starts an add-credential ceremony for an authenticated user.
    /// Existing credentials are excluded so the authenticator refuses to
    /// re-register one it already holds.
    pub async fn add_options(&self, user_id: &str) -> Result<CreationOptions, AuthError> {
        self.ensure_enabled()?;
        let user = self
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidRequest)?;
        check_user(&self.config, &user)?;

        let exclude = self
            .directory
            .authenticators_for_user(&user.id)
            .await?
            .into_iter()
            .map(|a| CredentialDescriptor {
                type_: "public-key".to_string(),
                id: a.credential_id,
            })
            .collect();
        let challenge = self.challenges.begin(&user.id).await?;
        let email = user.email.clone().unwrap_or_default();
        Ok(creation_options(
            &self.config,
            UserEntity {
                id: user.id,
                name: email,
                display_name: user.display_name,
            },
            exclude,
            challenge,
        ))
    }

    /// Completes an add-credential ceremony and stores the new key.
    pub async fn add_verify(
        &self,
        user_id: &str,
        credential: &RegisterCredential,
        nickname: Option<String>,
    ) -> Result<(), AuthError> {
        self.ensure_enabled()?;
        let user = self
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidRequest)?;
        check_user(&self.config, &user)?;

        let challenge = self.challenges.consume(&user.id).await?;
        let key = verify_registration(&self.config, &challenge, credential).map_err(|e| {
            warn!(user_id = %user.id, "attestation rejected: {e}");
            AuthError::InvalidRequest
        })?;
        self.directory
            .add_authenticator(Authenticator {
                credential_id: key.credential_id,
                user_id: user.id.clone(),
                public_key: key.public_key,
                alg: key.alg as i32,
                counter: key.counter,
                nickname,
                created_at: Utc::now(),
            })
            .await?;
        debug!(user_id = %user.id, "credential added");
        Ok(())
    }

    fn ensure_enabled(&self) -> Result<(), AuthError> {
        if self.config.webauthn_enabled {
            Ok(())
        } else {
            Err(AuthError::DisabledEndpoint)
        }
    }

    /// Applies the configured counter policy. Authenticators that report 0
    /// forever never trip it; a counter that fails to advance on a
    /// counter-capable credential indicates a possible clone.
    async fn reconcile_counter(
        &self,
        stored: &Authenticator,
        new_counter: u32,
    ) -> Result<(), AuthError> {
        if stored.counter == 0 && new_counter == 0 {
            return Ok(());
        }
        if new_counter > stored.counter {
            self.directory
                .update_authenticator_counter(&stored.credential_id, new_counter)
                .await?;
            return Ok(());
        }
        match self.config.counter_policy {
            CounterPolicy::Warn => {
                warn!(
                    credential_id = %stored.credential_id,
                    stored = stored.counter,
                    reported = new_counter,
                    "authenticator counter did not advance"
                );
                Ok(())
            }
            CounterPolicy::Reject => {
                warn!(
                    credential_id = %stored.credential_id,
                    stored = stored.counter,
                    reported = new_counter,
                    "rejecting assertion: counter did not advance"
                );
                Err(AuthError::InvalidRequest)
            }
        }
    }

    async fn send_verification_email(
        &self,
        user: &User,
        email: &str,
        options: &SignUpOptions,
    ) -> Result<(), AuthError> {
        let redirect_to = match &options.redirect_to {
            Some(redirect_to) => {
                validate_redirect_to(&self.config, redirect_to)?;
                redirect_to.clone()
            }
            None => self.config.client_url.clone(),
        };
        let ticket = Ticket::issue(
            TicketKind::VerifyEmail,
            Duration::seconds(i64::from(self.config.verify_email_ticket_ttl)),
        );
        let ticket_value = ticket.value.clone();
        self.directory
            .update_user(
                &user.id,
                UserUpdate {
                    ticket: Some(Some(ticket)),
                    ..Default::default()
                },
            )
            .await?;

        let link = generate_link(
            &self.config.server_url,
            LinkType::EmailVerify,
            &ticket_value,
            &redirect_to,
        );
        let data = TemplateData {
            link,
            display_name: user.display_name.clone(),
            email: email.to_string(),
            new_email: None,
            ticket: Some(ticket_value),
            otp: None,
            redirect_to: Some(redirect_to),
            locale: user.locale.clone(),
            server_url: self.config.server_url.clone(),
            client_url: self.config.client_url.clone(),
        };
        self.mailer
            .send(email, TemplateName::EmailVerify, data)
            .await
            .map_err(|e| {
                warn!(user_id = %user.id, "verification email delivery failed: {e}");
                AuthError::Internal(format!("email delivery failed: {e}"))
            })
    }
}
