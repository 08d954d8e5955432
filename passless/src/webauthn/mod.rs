//! WebAuthn ceremony plumbing: option building, attestation and assertion
//! verification, COSE public key handling.
//!
//! The flow layer owns challenge bookkeeping and persistence; this module is
//! pure ceremony cryptography and wire-format parsing.

mod auth;
mod cose;
mod errors;
mod register;
#[cfg(test)]
pub(crate) mod test_support;
mod types;

pub(crate) use auth::{request_options, verify_assertion};
pub(crate) use register::{creation_options, verify_registration};

pub use errors::WebAuthnError;
pub use types::{
    AssertionResponse, AttestationResponse, AuthenticatorSelection, CreationOptions,
    CredentialDescriptor, PubKeyCredParam, RegisterCredential, RelyingParty, RequestOptions,
    SignInCredential, UserEntity,
};
