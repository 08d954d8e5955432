use ciborium::value::Value as CborValue;
use tracing::debug;

use super::cose::{ALG_ES256, ALG_RS256, CredentialPublicKey, parse_cose_public_key};
use super::errors::WebAuthnError;
use super::types::{
    AuthenticatorData, AuthenticatorSelection, CreationOptions, CredentialDescriptor,
    ParsedClientData, PubKeyCredParam, RegisterCredential, RelyingParty, UserEntity,
};
use crate::config::AuthConfig;
use crate::utils::base64url_decode;

/// A freshly verified credential, ready to be stored.
pub(crate) struct RegisteredKey {
    pub(crate) credential_id: String,
    pub(crate) public_key: Vec<u8>,
    pub(crate) alg: i64,
    pub(crate) counter: u32,
}

pub(crate) fn creation_options(
    config: &AuthConfig,
    user: UserEntity,
    exclude_credentials: Vec<CredentialDescriptor>,
    challenge: String,
) -> CreationOptions {
    CreationOptions {
        challenge,
        rp: RelyingParty {
            id: config.webauthn_rp_id.clone(),
            name: config.webauthn_rp_name.clone(),
        },
        user,
        pub_key_cred_params: vec![
            PubKeyCredParam {
                type_: "public-key".to_string(),
                alg: ALG_ES256,
            },
            PubKeyCredParam {
                type_: "public-key".to_string(),
                alg: ALG_RS256,
            },
        ],
        authenticator_selection: AuthenticatorSelection {
            resident_key: "preferred".to_string(),
            require_resident_key: false,
            user_verification: "preferred".to_string(),
        },
        exclude_credentials,
        timeout: config.webauthn_timeout * 1000,
        attestation: "indirect".to_string(),
    }
}

/// Verifies a `navigator.credentials.create()` response against the
/// outstanding challenge and extracts the credential to store.
///
/// Attestation statements are not chased back to a vendor root; the `none`
/// and self-attestation cases cover the passkey ecosystem this serves.
pub(crate) fn verify_registration(
    config: &AuthConfig,
    expected_challenge: &str,
    credential: &RegisterCredential,
) -> Result<RegisteredKey, WebAuthnError> {
    if credential.type_ != "public-key" {
        return Err(WebAuthnError::Format(format!(
            "Unexpected credential type: {}",
            credential.type_
        )));
    }

    let client_data = ParsedClientData::from_base64(&credential.response.client_data_json)?;
    client_data.verify(
        "webauthn.create",
        expected_challenge,
        &config.webauthn_rp_origins,
    )?;

    let attestation = parse_attestation_object(&credential.response.attestation_object)?;
    debug!(fmt = %attestation.fmt, "parsed attestation object");

    let auth_data = AuthenticatorData::parse(attestation.auth_data)?;
    auth_data.verify(&config.webauthn_rp_id)?;
    if !auth_data.has_attested_credential_data() {
        return Err(WebAuthnError::AuthenticatorData(
            "No attested credential data present".to_string(),
        ));
    }

    let (credential_id, public_key) = parse_attested_credential_data(&auth_data.raw)?;
    if credential_id != credential.raw_id {
        return Err(WebAuthnError::Format(
            "Credential id does not match attested data".to_string(),
        ));
    }

    Ok(RegisteredKey {
        credential_id,
        public_key: public_key.key,
        alg: public_key.alg,
        counter: auth_data.counter,
    })
}

struct AttestationObject {
    fmt: String,
    auth_data: Vec<u8>,
}

fn parse_attestation_object(encoded: &str) -> Result<AttestationObject, WebAuthnError> {
    let raw = base64url_decode(encoded)
        .map_err(|e| WebAuthnError::Format(format!("Failed to decode attestation object: {e}")))?;
    let cbor: CborValue = ciborium::de::from_reader(&raw[..])
        .map_err(|e| WebAuthnError::Format(format!("Invalid attestation CBOR: {e}")))?;

    let CborValue::Map(map) = cbor else {
        return Err(WebAuthnError::Format(
            "Attestation object is not a CBOR map".to_string(),
        ));
    };

    let mut fmt = None;
    let mut auth_data = None;
    for (key, value) in map {
        let CborValue::Text(k) = key else { continue };
        match k.as_str() {
            "fmt" => {
                if let CborValue::Text(f) = value {
                    fmt = Some(f);
                }
            }
            "authData" => {
                if let CborValue::Bytes(data) = value {
                    auth_data = Some(data);
                }
            }
            _ => {}
        }
    }

    match (fmt, auth_data) {
        (Some(fmt), Some(auth_data)) => Ok(AttestationObject { fmt, auth_data }),
        _ => Err(WebAuthnError::Format(
            "Missing required attestation fields".to_string(),
        )),
    }
}

/// Walks past the fixed prefix and AAGUID to the credential id and COSE key.
fn parse_attested_credential_data(
    auth_data: &[u8],
) -> Result<(String, CredentialPublicKey), WebAuthnError> {
    let mut pos = 37; // rpIdHash (32) + flags (1) + signCount (4)
    if auth_data.len() < pos + 18 {
        return Err(WebAuthnError::Format(
            "Authenticator data too short for credential data".to_string(),
        ));
    }
    pos += 16; // AAGUID

    let cred_id_len = ((auth_data[pos] as usize) << 8) | (auth_data[pos + 1] as usize);
    pos += 2;
    if cred_id_len == 0 || cred_id_len > 1024 {
        return Err(WebAuthnError::Format(
            "Invalid credential id length".to_string(),
        ));
    }
    if auth_data.len() < pos + cred_id_len {
        return Err(WebAuthnError::Format(
            "Authenticator data too short for credential id".to_string(),
        ));
    }
    let credential_id = crate::utils::base64url_encode(&auth_data[pos..pos + cred_id_len]);
    pos += cred_id_len;

    let public_key = parse_cose_public_key(&auth_data[pos..])?;
    Ok((credential_id, public_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webauthn::test_support::{RegistrationForge, test_config};

    #[test]
    fn creation_options_carry_rp_and_params() {
        let config = test_config();
        let user = UserEntity {
            id: "user-1".to_string(),
            name: "dev@example.com".to_string(),
            display_name: "Dev".to_string(),
        };
        let options = creation_options(&config, user, Vec::new(), "chal".to_string());
        assert_eq!(options.rp.id, "localhost");
        assert_eq!(options.attestation, "indirect");
        assert_eq!(options.timeout, 60_000);
        let algs: Vec<i64> = options.pub_key_cred_params.iter().map(|p| p.alg).collect();
        assert_eq!(algs, vec![ALG_ES256, ALG_RS256]);
    }

    #[test]
    fn forged_registration_verifies() {
        let config = test_config();
        let forge = RegistrationForge::new("localhost");
        let credential = forge.credential("reg-challenge", "http://localhost:3000", 0);

        let key = verify_registration(&config, "reg-challenge", &credential).unwrap();
        assert_eq!(key.alg, ALG_ES256);
        assert_eq!(key.public_key, forge.public_key_point());
        assert_eq!(key.counter, 0);
        assert_eq!(key.credential_id, credential.raw_id);
    }

    #[test]
    fn registration_rejects_stale_challenge() {
        let config = test_config();
        let forge = RegistrationForge::new("localhost");
        let credential = forge.credential("old-challenge", "http://localhost:3000", 0);

        assert!(matches!(
            verify_registration(&config, "new-challenge", &credential),
            Err(WebAuthnError::Challenge(_))
        ));
    }

    #[test]
    fn registration_rejects_foreign_origin() {
        let config = test_config();
        let forge = RegistrationForge::new("localhost");
        let credential = forge.credential("reg-challenge", "https://evil.example.com", 0);

        assert!(matches!(
            verify_registration(&config, "reg-challenge", &credential),
            Err(WebAuthnError::ClientData(_))
        ));
    }

    #[test]
    fn registration_rejects_wrong_rp() {
        let config = test_config();
        let forge = RegistrationForge::new("other.example.com");
        let credential = forge.credential("reg-challenge", "http://localhost:3000", 0);

        assert!(matches!(
            verify_registration(&config, "reg-challenge", &credential),
            Err(WebAuthnError::AuthenticatorData(_))
        ));
    }
}
