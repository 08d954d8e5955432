use ring::digest;
use ring::signature::UnparsedPublicKey;

use super::cose::{ALG_ES256, ALG_RS256};
use super::errors::WebAuthnError;
use super::types::{
    AuthenticatorData, CredentialDescriptor, ParsedClientData, RequestOptions, SignInCredential,
};
use crate::config::AuthConfig;
use crate::directory::Authenticator;
use crate::utils::base64url_decode;

pub(crate) fn request_options(
    config: &AuthConfig,
    allow_credentials: Vec<CredentialDescriptor>,
    challenge: String,
) -> RequestOptions {
    RequestOptions {
        challenge,
        rp_id: config.webauthn_rp_id.clone(),
        allow_credentials,
        user_verification: "preferred".to_string(),
        timeout: config.webauthn_timeout * 1000,
    }
}

/// Verifies a `navigator.credentials.get()` assertion against a stored
/// credential and returns the authenticator's reported sign count.
///
/// The signature covers `authenticatorData || SHA-256(clientDataJSON)`.
pub(crate) fn verify_assertion(
    config: &AuthConfig,
    expected_challenge: &str,
    credential: &SignInCredential,
    stored: &Authenticator,
) -> Result<u32, WebAuthnError> {
    if credential.type_ != "public-key" {
        return Err(WebAuthnError::Format(format!(
            "Unexpected credential type: {}",
            credential.type_
        )));
    }

    let client_data = ParsedClientData::from_base64(&credential.response.client_data_json)?;
    client_data.verify(
        "webauthn.get",
        expected_challenge,
        &config.webauthn_rp_origins,
    )?;

    let auth_data_raw = base64url_decode(&credential.response.authenticator_data)
        .map_err(|e| WebAuthnError::Format(format!("Failed to decode authenticator data: {e}")))?;
    let auth_data = AuthenticatorData::parse(auth_data_raw)?;
    auth_data.verify(&config.webauthn_rp_id)?;

    let signature = base64url_decode(&credential.response.signature)
        .map_err(|e| WebAuthnError::Format(format!("Failed to decode signature: {e}")))?;

    let client_data_raw = base64url_decode(&credential.response.client_data_json)
        .map_err(|e| WebAuthnError::Format(format!("Failed to decode client data: {e}")))?;
    let client_data_hash = digest::digest(&digest::SHA256, &client_data_raw);
    let mut signed_data = Vec::with_capacity(auth_data.raw.len() + 32);
    signed_data.extend_from_slice(&auth_data.raw);
    signed_data.extend_from_slice(client_data_hash.as_ref());

    let algorithm: &dyn ring::signature::VerificationAlgorithm = match i64::from(stored.alg) {
        ALG_ES256 => &ring::signature::ECDSA_P256_SHA256_ASN1,
        ALG_RS256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
        other => return Err(WebAuthnError::UnsupportedAlgorithm(other)),
    };
    UnparsedPublicKey::new(algorithm, &stored.public_key)
        .verify(&signed_data, &signature)
        .map_err(|_| WebAuthnError::Signature)?;

    Ok(auth_data.counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::test_support::{AssertionForge, test_config};

    #[test]
    fn request_options_carry_rp_id_and_timeout() {
        let config = test_config();
        let options = request_options(&config, Vec::new(), "chal".to_string());
        assert_eq!(options.rp_id, "localhost");
        assert_eq!(options.timeout, 60_000);
        assert_eq!(options.user_verification, "preferred");
    }

    #[test]
    fn forged_assertion_verifies_and_reports_counter() {
        let config = test_config();
        let forge = AssertionForge::new("localhost");
        let stored = forge.stored_authenticator("user-1", 3);
        let credential = forge.credential("auth-challenge", "http://localhost:3000", 7);

        let counter = verify_assertion(&config, "auth-challenge", &credential, &stored).unwrap();
        assert_eq!(counter, 7);
    }

    #[test]
    fn assertion_with_wrong_key_fails() {
        let config = test_config();
        let forge = AssertionForge::new("localhost");
        let other = AssertionForge::new("localhost");
        let stored = other.stored_authenticator("user-1", 0);
        let credential = forge.credential("auth-challenge", "http://localhost:3000", 1);

        assert!(matches!(
            verify_assertion(&config, "auth-challenge", &credential, &stored),
            Err(WebAuthnError::Signature)
        ));
    }

    #[test]
    fn assertion_with_tampered_payload_fails() {
        let config = test_config();
        let forge = AssertionForge::new("localhost");
        let stored = forge.stored_authenticator("user-1", 0);
        let mut credential = forge.credential("auth-challenge", "http://localhost:3000", 1);
        // Flip the counter after signing.
        let mut raw = base64url_decode(&credential.response.authenticator_data).unwrap();
        raw[36] ^= 0x01;
        credential.response.authenticator_data = crate::utils::base64url_encode(raw);

        assert!(matches!(
            verify_assertion(&config, "auth-challenge", &credential, &stored),
            Err(WebAuthnError::Signature)
        ));
    }

    #[test]
    fn assertion_rejects_stale_challenge() {
        let config = test_config();
        let forge = AssertionForge::new("localhost");
        let stored = forge.stored_authenticator("user-1", 0);
        let credential = forge.credential("old", "http://localhost:3000", 1);

        assert!(matches!(
            verify_assertion(&config, "fresh", &credential, &stored),
            Err(WebAuthnError::Challenge(_))
        ));
    }
}
