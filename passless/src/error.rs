use thiserror::Error;

use crate::directory::DirectoryError;
use crate::utils::UtilError;

/// The flow-level error taxonomy.
///
/// Every variant carries a stable machine-readable code and a canonical
/// HTTP status. Validation and policy failures surface before any
/// mutation; verification-library failures are collapsed into the generic
/// `InvalidRequest` so raw cryptographic errors never reach a client, and
/// unknown-email cases share `InvalidEmailPassword` with wrong-credential
/// cases to avoid account enumeration.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The feature is disabled. Reported like an unknown route so callers
    /// cannot probe feature flags.
    #[error("resource does not exist")]
    DisabledEndpoint,

    #[error("incorrect email or password")]
    InvalidEmailPassword,

    #[error("the request payload is incorrect")]
    InvalidRequest,

    #[error("invalid or expired verification ticket")]
    InvalidTicket,

    #[error("email already in use")]
    EmailAlreadyInUse,

    #[error("the value of \"options.redirectTo\" is not allowed")]
    RedirectToNotAllowed,

    #[error("role not allowed")]
    RoleNotAllowed,

    #[error("default role must be part of the allowed roles")]
    DefaultRoleMustBeInAllowedRoles,

    #[error("user is disabled")]
    DisabledUser,

    #[error("user is not verified")]
    UnverifiedUser,

    #[error("forbidden for anonymous users")]
    ForbiddenAnonymous,

    #[error("sign-up is disabled")]
    SignupDisabled,

    #[error("internal server error")]
    Internal(String),
}

impl AuthError {
    /// Stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DisabledEndpoint => "disabled-endpoint",
            Self::InvalidEmailPassword => "invalid-email-password",
            Self::InvalidRequest => "invalid-request",
            Self::InvalidTicket => "invalid-or-expired-ticket",
            Self::EmailAlreadyInUse => "email-already-in-use",
            Self::RedirectToNotAllowed => "redirectTo-not-allowed",
            Self::RoleNotAllowed => "role-not-allowed",
            Self::DefaultRoleMustBeInAllowedRoles => "default-role-must-be-in-allowed-roles",
            Self::DisabledUser => "disabled-user",
            Self::UnverifiedUser => "unverified-user",
            Self::ForbiddenAnonymous => "forbidden-anonymous",
            Self::SignupDisabled => "signup-disabled",
            Self::Internal(_) => "internal-server-error",
        }
    }

    /// Canonical HTTP status for the variant.
    pub fn status(&self) -> u16 {
        match self {
            Self::DisabledEndpoint => 404,
            Self::InvalidEmailPassword | Self::InvalidRequest | Self::InvalidTicket => 401,
            Self::EmailAlreadyInUse => 409,
            Self::RedirectToNotAllowed
            | Self::RoleNotAllowed
            | Self::DefaultRoleMustBeInAllowedRoles => 400,
            Self::DisabledUser
            | Self::UnverifiedUser
            | Self::ForbiddenAnonymous
            | Self::SignupDisabled => 403,
            Self::Internal(_) => 500,
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::DuplicateEmail => Self::EmailAlreadyInUse,
            DirectoryError::DuplicateCredential => Self::InvalidRequest,
            // A lookup that flows expect to succeed has no user-facing
            // meaning when it misses; call sites that care match NotFound
            // before converting.
            DirectoryError::NotFound => Self::Internal("user record vanished".to_string()),
            DirectoryError::Storage(msg) | DirectoryError::InvalidData(msg) => Self::Internal(msg),
        }
    }
}

impl From<UtilError> for AuthError {
    fn from(err: UtilError) -> Self {
        Self::Internal(err.to_string())
    }
}
