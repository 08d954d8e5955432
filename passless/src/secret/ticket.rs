use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Flow namespace for a ticket value. The namespace is baked into the
/// stored value (`passwordlessEmail:<uuid>`) so tickets from different
/// flows are never interchangeable, even compared as raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketKind {
    PasswordlessEmail,
    VerifyEmail,
    MfaTotp,
}

impl TicketKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::PasswordlessEmail => "passwordlessEmail",
            Self::VerifyEmail => "verifyEmail",
            Self::MfaTotp => "mfaTotp",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "passwordlessEmail" => Some(Self::PasswordlessEmail),
            "verifyEmail" => Some(Self::VerifyEmail),
            "mfaTotp" => Some(Self::MfaTotp),
            _ => None,
        }
    }
}

/// A single-use credential proving possession of an out-of-band channel.
///
/// At most one ticket is meaningful per user at a time; issuing a new one
/// supersedes the previous value because it occupies a single slot on the
/// user record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Ticket {
    /// Issue a fresh ticket. The TTL is always chosen by the caller, per
    /// flow; there is no implicit default.
    pub fn issue(kind: TicketKind, ttl: Duration) -> Self {
        Self {
            value: format!("{}:{}", kind.prefix(), Uuid::new_v4()),
            expires_at: Utc::now() + ttl,
        }
    }

    /// The namespace this ticket was issued under, if the stored value is
    /// well formed.
    pub fn kind(&self) -> Option<TicketKind> {
        let (prefix, _) = self.value.split_once(':')?;
        TicketKind::from_prefix(prefix)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Constant-time comparison against a presented value. Returns false
    /// for length mismatches without early exit on content.
    pub fn matches(&self, presented: &str) -> bool {
        self.value.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

// The ticket value is a bearer secret; keep it out of log output.
impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("value", &"<redacted>")
            .field("kind", &self.kind())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_is_namespaced_and_unique() {
        let a = Ticket::issue(TicketKind::PasswordlessEmail, Duration::seconds(3600));
        let b = Ticket::issue(TicketKind::PasswordlessEmail, Duration::seconds(3600));
        assert!(a.value.starts_with("passwordlessEmail:"));
        assert_ne!(a.value, b.value);
        assert_eq!(a.kind(), Some(TicketKind::PasswordlessEmail));
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let verify = Ticket::issue(TicketKind::VerifyEmail, Duration::seconds(60));
        assert_eq!(verify.kind(), Some(TicketKind::VerifyEmail));
        assert!(verify.value.starts_with("verifyEmail:"));
        let uuid_part = verify.value.split_once(':').unwrap().1.to_string();
        let forged = format!("passwordlessEmail:{uuid_part}");
        assert!(!verify.matches(&forged));
    }

    #[test]
    fn test_expiry() {
        let ticket = Ticket::issue(TicketKind::PasswordlessEmail, Duration::seconds(3600));
        assert!(!ticket.is_expired(Utc::now()));
        assert!(ticket.is_expired(Utc::now() + Duration::seconds(3601)));
    }

    #[test]
    fn test_matches_exact_value_only() {
        let ticket = Ticket::issue(TicketKind::PasswordlessEmail, Duration::seconds(3600));
        assert!(ticket.matches(&ticket.value.clone()));
        assert!(!ticket.matches(""));
        assert!(!ticket.matches(&ticket.value[..ticket.value.len() - 1]));
        let mut off_by_one = ticket.value.clone().into_bytes();
        let last = off_by_one.len() - 1;
        off_by_one[last] ^= 1;
        assert!(!ticket.matches(std::str::from_utf8(&off_by_one).unwrap()));
    }

    #[test]
    fn test_debug_redacts_value() {
        let ticket = Ticket::issue(TicketKind::PasswordlessEmail, Duration::seconds(3600));
        let debug = format!("{ticket:?}");
        assert!(!debug.contains(&ticket.value));
        assert!(debug.contains("<redacted>"));
    }
}
