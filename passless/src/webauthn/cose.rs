//! COSE credential public key parsing.
//!
//! Keys arrive inside the attested credential data as a COSE_Key map. Only
//! ES256 (EC2 over P-256) and RS256 keys are accepted, matching the
//! `pubKeyCredParams` offered at registration. The parsed key is stored in
//! the form the verifier consumes directly: an uncompressed SEC1 point for
//! ES256, a DER `RSAPublicKey` for RS256.

use ciborium::value::Value as CborValue;

use super::errors::WebAuthnError;

pub(crate) const ALG_ES256: i64 = -7;
pub(crate) const ALG_RS256: i64 = -257;

const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;

/// A credential public key in verification-ready byte form.
pub(crate) struct CredentialPublicKey {
    pub(crate) alg: i64,
    pub(crate) key: Vec<u8>,
}

pub(super) fn parse_cose_public_key(raw: &[u8]) -> Result<CredentialPublicKey, WebAuthnError> {
    let cose: CborValue = ciborium::de::from_reader(raw)
        .map_err(|e| WebAuthnError::Format(format!("Invalid public key CBOR: {e}")))?;
    let CborValue::Map(map) = cose else {
        return Err(WebAuthnError::Format(
            "Public key is not a CBOR map".to_string(),
        ));
    };

    let mut kty = None;
    let mut alg = None;
    let mut crv = None;
    // EC2: -2 = x, -3 = y. RSA: -1 = n, -2 = e.
    let mut neg1 = None;
    let mut neg2 = None;
    let mut neg3 = None;

    for (key, value) in map {
        let CborValue::Integer(label) = key else {
            continue;
        };
        let label: i128 = label.into();
        match label {
            1 => kty = as_int(&value),
            3 => alg = as_int(&value),
            -1 => {
                crv = as_int(&value);
                neg1 = as_bytes(value);
            }
            -2 => neg2 = as_bytes(value),
            -3 => neg3 = as_bytes(value),
            _ => {}
        }
    }

    let kty = kty.ok_or_else(|| WebAuthnError::Format("Missing key type".to_string()))?;
    let alg = alg.ok_or_else(|| WebAuthnError::Format("Missing key algorithm".to_string()))?;

    match (kty, alg) {
        (KTY_EC2, ALG_ES256) => {
            if crv != Some(CRV_P256) {
                return Err(WebAuthnError::Format(
                    "ES256 key must use the P-256 curve".to_string(),
                ));
            }
            let x = neg2
                .ok_or_else(|| WebAuthnError::Format("Missing x coordinate".to_string()))?;
            let y = neg3
                .ok_or_else(|| WebAuthnError::Format("Missing y coordinate".to_string()))?;
            if x.len() != 32 || y.len() != 32 {
                return Err(WebAuthnError::Format(
                    "Invalid P-256 coordinate length".to_string(),
                ));
            }
            let mut key = Vec::with_capacity(65);
            key.push(0x04);
            key.extend_from_slice(&x);
            key.extend_from_slice(&y);
            Ok(CredentialPublicKey { alg, key })
        }
        (KTY_RSA, ALG_RS256) => {
            let n = neg1
                .ok_or_else(|| WebAuthnError::Format("Missing RSA modulus".to_string()))?;
            let e = neg2
                .ok_or_else(|| WebAuthnError::Format("Missing RSA exponent".to_string()))?;
            Ok(CredentialPublicKey {
                alg,
                key: rsa_public_key_der(&n, &e),
            })
        }
        (_, alg) => Err(WebAuthnError::UnsupportedAlgorithm(alg)),
    }
}

fn as_int(value: &CborValue) -> Option<i64> {
    if let CborValue::Integer(i) = value {
        let wide: i128 = (*i).into();
        i64::try_from(wide).ok()
    } else {
        None
    }
}

fn as_bytes(value: CborValue) -> Option<Vec<u8>> {
    if let CborValue::Bytes(b) = value {
        Some(b)
    } else {
        None
    }
}

/// Encodes `RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent
/// INTEGER }`, the form `ring` expects for PKCS#1 verification.
fn rsa_public_key_der(n: &[u8], e: &[u8]) -> Vec<u8> {
    let n = der_integer(n);
    let e = der_integer(e);
    let mut body = Vec::with_capacity(n.len() + e.len());
    body.extend_from_slice(&n);
    body.extend_from_slice(&e);

    let mut out = vec![0x30];
    der_length(&mut out, body.len());
    out.extend_from_slice(&body);
    out
}

fn der_integer(bytes: &[u8]) -> Vec<u8> {
    let mut start = 0;
    while start + 1 < bytes.len() && bytes[start] == 0 {
        start += 1;
    }
    let trimmed = &bytes[start..];
    let needs_pad = trimmed.first().is_some_and(|b| b & 0x80 != 0);

    let mut out = vec![0x02];
    der_length(&mut out, trimmed.len() + usize::from(needs_pad));
    if needs_pad {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

fn der_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let len_bytes = len.to_be_bytes();
        let skip = len_bytes.iter().take_while(|b| **b == 0).count();
        let len_bytes = &len_bytes[skip..];
        out.push(0x80 | len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}
