use thiserror::Error;

/// Errors raised while parsing or verifying WebAuthn ceremony payloads.
#[derive(Debug, Error)]
pub enum WebAuthnError {
    /// Malformed base64, CBOR or JSON in a ceremony payload.
    #[error("Format error: {0}")]
    Format(String),

    /// Client data failed a check (type, origin).
    #[error("Client data error: {0}")]
    ClientData(String),

    /// Challenge missing or not matching the outstanding one.
    #[error("Challenge error: {0}")]
    Challenge(String),

    /// Authenticator data failed a structural or rpIdHash check.
    #[error("Authenticator data error: {0}")]
    AuthenticatorData(String),

    /// Assertion signature did not verify against the stored public key.
    #[error("Signature verification failed")]
    Signature,

    /// COSE key used an algorithm this server does not accept.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),
}

impl From<crate::utils::UtilError> for WebAuthnError {
    fn from(err: crate::utils::UtilError) -> Self {
        WebAuthnError::Format(err.to_string())
    }
}
