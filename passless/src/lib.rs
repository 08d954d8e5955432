//! passless - passwordless and WebAuthn authentication core
//!
//! This crate implements the credential-ceremony side of an auth backend:
//! magic links, passwordless email with OTP codes, WebAuthn registration and
//! authentication ceremonies, and the session issuance they all converge on.
//! HTTP bindings live in the companion `passless-axum` crate.

mod challenge;
mod config;
mod delivery;
mod directory;
mod error;
mod flows;
mod secret;
mod session;
mod utils;
mod webauthn;

pub use config::{AuthConfig, CounterPolicy};
pub use error::AuthError;

pub use directory::{
    Authenticator, DirectoryError, MemoryDirectory, SqliteDirectory, User, UserDirectory,
    UserUpdate,
};

pub use delivery::{DeliveryError, Emailer, RecordingMailer, SentEmail, TemplateData, TemplateName};

pub use flows::{PasswordlessFlow, SignUpOptions, WebauthnFlow};

pub use session::{
    AccessClaims, MfaChallenge, PublicUser, Session, SessionIssuer, SignInResponse,
    verify_access_token,
};

pub use webauthn::{
    AssertionResponse, AttestationResponse, AuthenticatorSelection, CreationOptions,
    CredentialDescriptor, PubKeyCredParam, RegisterCredential, RelyingParty, RequestOptions,
    SignInCredential, UserEntity, WebAuthnError,
};

pub use secret::{OtpSecret, Ticket, TicketKind};

pub use utils::gen_random_string;
