//! Magic-link and passwordless-email flows: issue a single-use secret to a
//! (possibly just-created) user, deliver it out of band, redeem it for a
//! session.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::{
    LinkType, SignUpOptions, check_user, generate_link, resolve_signup_options, validate_email,
    validate_redirect_to,
};
use crate::config::AuthConfig;
use crate::delivery::{Emailer, TemplateData, TemplateName};
use crate::directory::{User, UserDirectory, UserUpdate};
use crate::error::AuthError;
use crate::secret::{Ticket, TicketKind, issue_otp};
use crate::session::{SessionIssuer, SignInResponse};

pub struct PasswordlessFlow {
    config: Arc<AuthConfig>,
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Emailer>,
    sessions: Arc<SessionIssuer>,
}

impl PasswordlessFlow {
    pub fn new(
        config: Arc<AuthConfig>,
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Emailer>,
        sessions: Arc<SessionIssuer>,
    ) -> Self {
        Self {
            config,
            directory,
            mailer,
            sessions,
        }
    }

    /// Starts a magic-link sign-in: a `passwordlessEmail:` ticket is stored
    /// on the user and mailed as a verification link.
    pub async fn start_magic_link(
        &self,
        email: &str,
        options: &SignUpOptions,
    ) -> Result<(), AuthError> {
        if !self.config.magic_link_enabled {
            return Err(AuthError::DisabledEndpoint);
        }
        let (user, redirect_to) = self.resolve_or_create_user(email, options).await?;

        let ticket = Ticket::issue(
            TicketKind::PasswordlessEmail,
            Duration::seconds(i64::from(self.config.ticket_ttl)),
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

        self.send_signin_email(&user, ticket_value, None, redirect_to)
            .await
    }

    /// Starts a passwordless-email sign-in. Both secrets are stored in one
    /// write: the ticket backs the emailed link, the OTP backs manual code
    /// entry, and either one completes the flow.
    pub async fn start_passwordless_email(
        &self,
        email: &str,
        options: &SignUpOptions,
    ) -> Result<(), AuthError> {
        if !self.config.passwordless_email_enabled {
            return Err(AuthError::DisabledEndpoint);
        }
        let (user, redirect_to) = self.resolve_or_create_user(email, options).await?;

        let ticket = Ticket::issue(
            TicketKind::PasswordlessEmail,
            Duration::seconds(i64::from(self.config.ticket_ttl)),
        );
        let ticket_value = ticket.value.clone();
        let issued = issue_otp(Duration::seconds(i64::from(self.config.otp_ttl)))?;
        self.directory
            .update_user(
                &user.id,
                UserUpdate {
                    ticket: Some(Some(ticket)),
                    otp: Some(Some(issued.secret)),
                    otp_method_last_used: Some(Some("email".to_string())),
                    ..Default::default()
                },
            )
            .await?;

        self.send_signin_email(&user, ticket_value, Some(issued.code), redirect_to)
            .await
    }

    /// Redeems a presented ticket value. The ticket is consumed as soon as
    /// it proves valid, so later failures in the same request still burn it.
    pub async fn complete_ticket(&self, presented: &str) -> Result<SignInResponse, AuthError> {
        let user = self
            .directory
            .find_by_ticket(presented)
            .await?
            .ok_or(AuthError::InvalidTicket)?;
        let Some(ticket) = user.ticket.clone() else {
            return Err(AuthError::InvalidTicket);
        };
        if !ticket.matches(presented) || ticket.is_expired(Utc::now()) {
            debug!(user_id = %user.id, "stale or expired ticket presented");
            return Err(AuthError::InvalidTicket);
        }
        let kind = ticket.kind().ok_or(AuthError::InvalidTicket)?;

        self.directory
            .update_user(
                &user.id,
                UserUpdate {
                    ticket: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        if user.disabled {
            warn!(user_id = %user.id, "disabled user presented a valid ticket");
            return Err(AuthError::DisabledUser);
        }

        match kind {
            TicketKind::PasswordlessEmail | TicketKind::VerifyEmail => {
                // Redeeming a ticket from the mailbox proves ownership.
                if !user.email_verified {
                    self.directory
                        .update_user(
                            &user.id,
                            UserUpdate {
                                email_verified: Some(true),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
                self.sessions.issue(&user.id, true).await
            }
            // TOTP challenges are redeemed by the TOTP subsystem, not here.
            TicketKind::MfaTotp => Err(AuthError::InvalidTicket),
        }
    }

    /// Redeems a manually entered OTP for the given email. Mismatch and
    /// expiry are indistinguishable to the caller.
    pub async fn complete_otp(&self, email: &str, code: &str) -> Result<SignInResponse, AuthError> {
        if !self.config.passwordless_email_enabled {
            return Err(AuthError::DisabledEndpoint);
        }
        let email = validate_email(&self.config, email)?;
        let user = self
            .directory
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidTicket)?;
        let Some(otp) = user.otp.clone() else {
            return Err(AuthError::InvalidTicket);
        };
        if !otp.verify(code, Utc::now()) {
            debug!(user_id = %user.id, "OTP rejected");
            return Err(AuthError::InvalidTicket);
        }

        // Consume both secrets: the emailed link and the code were issued
        // together and one redemption settles the sign-in.
        self.directory
            .update_user(
                &user.id,
                UserUpdate {
                    otp: Some(None),
                    ticket: Some(None),
                    email_verified: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        if user.disabled {
            warn!(user_id = %user.id, "disabled user presented a valid OTP");
            return Err(AuthError::DisabledUser);
        }
        self.sessions.issue(&user.id, true).await
    }

    /// Finds the user for a start request, creating one when sign-up is
    /// open. Returns the user and the validated redirect target.
    async fn resolve_or_create_user(
        &self,
        email: &str,
        options: &SignUpOptions,
    ) -> Result<(User, String), AuthError> {
        let email = validate_email(&self.config, email)?;
        if let Some(user) = self.directory.find_by_email(&email).await? {
            let redirect_to = match &options.redirect_to {
                Some(redirect_to) => {
                    validate_redirect_to(&self.config, redirect_to)?;
                    redirect_to.clone()
                }
                None => self.config.client_url.clone(),
            };
            check_user(&self.config, &user)?;
            return Ok((user, redirect_to));
        }

        if self.config.disable_signup {
            return Err(AuthError::SignupDisabled);
        }
        let resolved = resolve_signup_options(&self.config, &email, options)?;
        let mut user = User::new(Some(email), resolved.display_name);
        user.locale = resolved.locale;
        user.default_role = resolved.default_role;
        user.allowed_roles = resolved.allowed_roles;
        user.disabled = self.config.disable_new_users;
        let user = self.directory.insert_user(user).await?;
        debug!(user_id = %user.id, "user created by passwordless start");

        // The row is kept either way; a disabled sign-up is still a sign-up.
        if user.disabled {
            return Err(AuthError::DisabledUser);
        }
        Ok((user, resolved.redirect_to))
    }

    async fn send_signin_email(
        &self,
        user: &User,
        ticket: String,
        otp: Option<String>,
        redirect_to: String,
    ) -> Result<(), AuthError> {
        let email = user
            .email
            .clone()
            .ok_or_else(|| AuthError::Internal("user has no email address".to_string()))?;
        let link = generate_link(
            &self.config.server_url,
            LinkType::SigninPasswordless,
            &ticket,
            &redirect_to,
        );
        let data = TemplateData {
            link,
            display_name: user.display_name.clone(),
            email: email.clone(),
            new_email: None,
            ticket: Some(ticket),
            otp,
            redirect_to: Some(redirect_to),
            locale: user.locale.clone(),
            server_url: self.config.server_url.clone(),
            client_url: self.config.client_url.clone(),
        };
        self.mailer
            .send(&email, TemplateName::SigninPasswordless, data)
            .await
            .map_err(|e| {
                warn!(user_id = %user.id, "sign-in email delivery failed: {e}");
                AuthError::Internal(format!("email delivery failed: {e}"))
            })
    }
}
