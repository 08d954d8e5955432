//! Ceremony forging helpers shared by the unit tests. These build real
//! attestation objects and assertions with a throwaway P-256 key so the
//! verifiers run against honest inputs.

use chrono::Utc;
use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

use super::types::{
    AssertionResponse, AttestationResponse, FLAG_ATTESTED_CREDENTIAL_DATA, FLAG_USER_PRESENT,
    RegisterCredential, SignInCredential,
};
use crate::config::AuthConfig;
use crate::directory::Authenticator;
use crate::utils::base64url_encode;

pub(crate) fn test_config() -> AuthConfig {
    AuthConfig::default()
}

fn generate_keypair() -> EcdsaKeyPair {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap()
}

fn client_data_json(type_: &str, challenge: &str, origin: &str) -> String {
    base64url_encode(
        serde_json::json!({
            "type": type_,
            "challenge": challenge,
            "origin": origin,
        })
        .to_string(),
    )
}

fn auth_data_prefix(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(37);
    out.extend_from_slice(digest::digest(&digest::SHA256, rp_id.as_bytes()).as_ref());
    out.push(flags);
    out.extend_from_slice(&counter.to_be_bytes());
    out
}

fn cose_ec2_key(point: &[u8]) -> Vec<u8> {
    let map = CborValue::Map(vec![
        (
            CborValue::Integer(Integer::from(1)),
            CborValue::Integer(Integer::from(2)),
        ),
        (
            CborValue::Integer(Integer::from(3)),
            CborValue::Integer(Integer::from(-7)),
        ),
        (
            CborValue::Integer(Integer::from(-1)),
            CborValue::Integer(Integer::from(1)),
        ),
        (
            CborValue::Integer(Integer::from(-2)),
            CborValue::Bytes(point[1..33].to_vec()),
        ),
        (
            CborValue::Integer(Integer::from(-3)),
            CborValue::Bytes(point[33..65].to_vec()),
        ),
    ]);
    let mut out = Vec::new();
    ciborium::ser::into_writer(&map, &mut out).unwrap();
    out
}

pub(crate) struct RegistrationForge {
    keypair: EcdsaKeyPair,
    rp_id: String,
    credential_id: Vec<u8>,
}

impl RegistrationForge {
    pub(crate) fn new(rp_id: &str) -> Self {
        Self {
            keypair: generate_keypair(),
            rp_id: rp_id.to_string(),
            credential_id: b"forged-credential-0001".to_vec(),
        }
    }

    pub(crate) fn public_key_point(&self) -> Vec<u8> {
        self.keypair.public_key().as_ref().to_vec()
    }

    pub(crate) fn credential(
        &self,
        challenge: &str,
        origin: &str,
        counter: u32,
    ) -> RegisterCredential {
        let mut auth_data = auth_data_prefix(
            &self.rp_id,
            FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL_DATA,
            counter,
        );
        auth_data.extend_from_slice(&[0u8; 16]); // AAGUID
        auth_data.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(&self.credential_id);
        auth_data.extend_from_slice(&cose_ec2_key(&self.public_key_point()));

        let attestation = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text("none".to_string()),
            ),
            (
                CborValue::Text("attStmt".to_string()),
                CborValue::Map(Vec::new()),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(auth_data),
            ),
        ]);
        let mut attestation_bytes = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_bytes).unwrap();

        let id = base64url_encode(&self.credential_id);
        RegisterCredential {
            id: id.clone(),
            raw_id: id,
            type_: "public-key".to_string(),
            response: AttestationResponse {
                client_data_json: client_data_json("webauthn.create", challenge, origin),
                attestation_object: base64url_encode(attestation_bytes),
            },
        }
    }
}

pub(crate) struct AssertionForge {
    keypair: EcdsaKeyPair,
    rp_id: String,
    credential_id: Vec<u8>,
}

impl AssertionForge {
    pub(crate) fn new(rp_id: &str) -> Self {
        Self {
            keypair: generate_keypair(),
            rp_id: rp_id.to_string(),
            credential_id: b"forged-credential-0002".to_vec(),
        }
    }

    pub(crate) fn stored_authenticator(&self, user_id: &str, counter: u32) -> Authenticator {
        Authenticator {
            credential_id: base64url_encode(&self.credential_id),
            user_id: user_id.to_string(),
            public_key: self.keypair.public_key().as_ref().to_vec(),
            alg: -7,
            counter,
            nickname: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn credential(
        &self,
        challenge: &str,
        origin: &str,
        counter: u32,
    ) -> SignInCredential {
        let auth_data = auth_data_prefix(&self.rp_id, FLAG_USER_PRESENT, counter);
        let client_data = client_data_json("webauthn.get", challenge, origin);
        let client_data_raw = crate::utils::base64url_decode(&client_data).unwrap();

        let mut signed_data = auth_data.clone();
        signed_data
            .extend_from_slice(digest::digest(&digest::SHA256, &client_data_raw).as_ref());
        let rng = SystemRandom::new();
        let signature = self.keypair.sign(&rng, &signed_data).unwrap();

        let id = base64url_encode(&self.credential_id);
        SignInCredential {
            id: id.clone(),
            raw_id: id,
            type_: "public-key".to_string(),
            response: AssertionResponse {
                client_data_json: client_data,
                authenticator_data: base64url_encode(auth_data),
                signature: base64url_encode(signature.as_ref()),
                user_handle: None,
            },
        }
    }
}
