use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::secret::{OtpSecret, Ticket};

/// An identity record.
///
/// The ticket, OTP and challenge fields are single slots with
/// last-writer-wins semantics: issuing a new secret supersedes any prior
/// one, and completion always compares against the currently stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Unique across all users; always stored case-normalized. Pending
    /// WebAuthn sign-ups have no email yet, only `new_email`.
    pub email: Option<String>,
    /// Email claimed but not yet confirmed; swapped into `email` when a
    /// sign-up ceremony completes.
    pub new_email: Option<String>,
    pub display_name: String,
    pub locale: String,
    pub default_role: String,
    pub allowed_roles: Vec<String>,
    pub disabled: bool,
    pub email_verified: bool,
    pub is_anonymous: bool,
    pub ticket: Option<Ticket>,
    pub otp: Option<OtpSecret>,
    pub otp_method_last_used: Option<String>,
    /// The in-flight WebAuthn challenge (base64url), if any. Read exactly
    /// once at verification, then cleared.
    pub current_challenge: Option<String>,
    pub active_mfa_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A minimal user with generated id and everything else defaulted;
    /// flows fill in the policy-derived fields before insertion.
    pub fn new(email: Option<String>, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email,
            new_email: None,
            display_name,
            locale: String::new(),
            default_role: String::new(),
            allowed_roles: Vec::new(),
            disabled: false,
            email_verified: false,
            is_anonymous: false,
            ticket: None,
            otp: None,
            otp_method_last_used: None,
            current_challenge: None,
            active_mfa_type: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered WebAuthn credential bound to a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Authenticator {
    /// base64url credential id; globally unique.
    pub credential_id: String,
    pub user_id: String,
    /// Key material in verification-ready form: uncompressed point for
    /// ES256, DER `RSAPublicKey` for RS256.
    pub public_key: Vec<u8>,
    /// COSE algorithm identifier (-7 ES256, -257 RS256).
    pub alg: i32,
    /// Signature counter; monotonically non-decreasing, 0 when the
    /// authenticator does not support counters.
    pub counter: u32,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A partial update applied to a user record. Outer `None` leaves the
/// field untouched; for clearable slots, `Some(None)` clears the slot.
#[derive(Debug, Default, Clone)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub new_email: Option<Option<String>>,
    pub display_name: Option<String>,
    pub email_verified: Option<bool>,
    pub is_anonymous: Option<bool>,
    pub disabled: Option<bool>,
    pub ticket: Option<Option<Ticket>>,
    pub otp: Option<Option<OtpSecret>>,
    pub otp_method_last_used: Option<Option<String>>,
    pub current_challenge: Option<Option<String>>,
}

impl UserUpdate {
    /// Apply the patch. Shared by every directory implementation so the
    /// read-modify-write semantics stay identical across backends.
    pub(crate) fn apply(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = Some(email);
        }
        if let Some(new_email) = self.new_email {
            user.new_email = new_email;
        }
        if let Some(display_name) = self.display_name {
            user.display_name = display_name;
        }
        if let Some(email_verified) = self.email_verified {
            user.email_verified = email_verified;
        }
        if let Some(is_anonymous) = self.is_anonymous {
            user.is_anonymous = is_anonymous;
        }
        if let Some(disabled) = self.disabled {
            user.disabled = disabled;
        }
        if let Some(ticket) = self.ticket {
            user.ticket = ticket;
        }
        if let Some(otp) = self.otp {
            user.otp = otp;
        }
        if let Some(otp_method_last_used) = self.otp_method_last_used {
            user.otp_method_last_used = otp_method_last_used;
        }
        if let Some(current_challenge) = self.current_challenge {
            user.current_challenge = current_challenge;
        }
        user.updated_at = Utc::now();
    }
}
