use ring::digest;
use serde::{Deserialize, Serialize};

use super::errors::WebAuthnError;
use crate::utils::base64url_decode;

#[derive(Serialize, Debug, Clone)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
}

/// User entity sent to `navigator.credentials.create()`. The `id` carries the
/// directory user id so the authenticator hands it back as the user handle.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: i64,
}

#[derive(Serialize, Debug, Clone)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: String,
}

/// Options for `navigator.credentials.create()`, per the WebAuthn JSON
/// serialization.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub challenge: String,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    pub authenticator_selection: AuthenticatorSelection,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub timeout: u32,
    pub attestation: String,
}

/// Options for `navigator.credentials.get()`.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    pub challenge: String,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: String,
    pub timeout: u32,
}

#[derive(Deserialize, Debug)]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
}

/// Credential returned by the browser after `navigator.credentials.create()`.
#[derive(Deserialize, Debug)]
pub struct RegisterCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AttestationResponse,
}

#[derive(Deserialize, Debug)]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle")]
    pub user_handle: Option<String>,
}

/// Credential returned by the browser after `navigator.credentials.get()`.
#[derive(Deserialize, Debug)]
pub struct SignInCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AssertionResponse,
}

#[derive(Deserialize, Debug)]
pub(super) struct ParsedClientData {
    #[serde(rename = "type")]
    pub(super) type_: String,
    pub(super) challenge: String,
    pub(super) origin: String,
}

impl ParsedClientData {
    pub(super) fn from_base64(encoded: &str) -> Result<Self, WebAuthnError> {
        let raw = base64url_decode(encoded)
            .map_err(|e| WebAuthnError::Format(format!("Failed to decode client data: {e}")))?;
        let text = String::from_utf8(raw)
            .map_err(|e| WebAuthnError::Format(format!("Client data is not valid UTF-8: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| WebAuthnError::Format(format!("Failed to parse client data JSON: {e}")))
    }

    /// Checks the ceremony type, the outstanding challenge and the origin
    /// against the server's allow-list.
    pub(super) fn verify(
        &self,
        expected_type: &str,
        expected_challenge: &str,
        allowed_origins: &[String],
    ) -> Result<(), WebAuthnError> {
        if self.type_ != expected_type {
            return Err(WebAuthnError::ClientData(format!(
                "Invalid type: {}",
                self.type_
            )));
        }
        // The challenge was handed out as a base64url string, and the browser
        // re-encodes the raw bytes to the same string, so a direct comparison
        // is sound.
        if self.challenge != expected_challenge {
            return Err(WebAuthnError::Challenge(
                "Challenge does not match".to_string(),
            ));
        }
        if !allowed_origins.iter().any(|o| o == &self.origin) {
            return Err(WebAuthnError::ClientData(format!(
                "Origin not allowed: {}",
                self.origin
            )));
        }
        Ok(())
    }
}

pub(super) const FLAG_USER_PRESENT: u8 = 1 << 0;
pub(super) const FLAG_USER_VERIFIED: u8 = 1 << 2;
pub(super) const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 1 << 6;

/// Fixed-size prefix of the authenticator data structure: rpIdHash (32),
/// flags (1), signCount (4).
pub(super) struct AuthenticatorData {
    pub(super) rp_id_hash: [u8; 32],
    pub(super) flags: u8,
    pub(super) counter: u32,
    pub(super) raw: Vec<u8>,
}

impl AuthenticatorData {
    pub(super) fn parse(raw: Vec<u8>) -> Result<Self, WebAuthnError> {
        if raw.len() < 37 {
            return Err(WebAuthnError::AuthenticatorData(
                "Authenticator data too short".to_string(),
            ));
        }
        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&raw[..32]);
        let flags = raw[32];
        let counter = u32::from_be_bytes([raw[33], raw[34], raw[35], raw[36]]);
        Ok(Self {
            rp_id_hash,
            flags,
            counter,
            raw,
        })
    }

    pub(super) fn verify(&self, rp_id: &str) -> Result<(), WebAuthnError> {
        let expected = digest::digest(&digest::SHA256, rp_id.as_bytes());
        if self.rp_id_hash != expected.as_ref() {
            return Err(WebAuthnError::AuthenticatorData(
                "rpIdHash does not match the relying party".to_string(),
            ));
        }
        if self.flags & FLAG_USER_PRESENT == 0 {
            return Err(WebAuthnError::AuthenticatorData(
                "User presence flag not set".to_string(),
            ));
        }
        Ok(())
    }

    pub(super) fn has_attested_credential_data(&self) -> bool {
        self.flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0
    }
}
