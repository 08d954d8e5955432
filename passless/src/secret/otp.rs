use std::fmt;

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::utils::{UtilError, base64url_decode, base64url_encode, fill_random};

type HmacSha256 = Hmac<Sha256>;

const OTP_DIGITS: u32 = 1_000_000;
const SALT_LEN: usize = 16;

/// A freshly issued one-time password. The plaintext `code` exists only to
/// be handed to the out-of-band delivery channel; everything persisted is
/// in `secret`.
pub struct IssuedOtp {
    pub code: String,
    pub secret: OtpSecret,
}

/// The at-rest form of an OTP: a salted HMAC-SHA-256 of the code and an
/// absolute expiry. The plaintext is never stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpSecret {
    /// `{base64url(salt)}:{base64url(hmac_sha256(salt, code))}`
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue a 6-digit OTP with the given TTL. The code is drawn from the
/// secure RNG with rejection sampling so every value is equally likely.
pub fn issue_otp(ttl: Duration) -> Result<IssuedOtp, UtilError> {
    let code = format!("{:06}", uniform_u32(OTP_DIGITS)?);

    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    let mac = hash_code(&salt, &code)?;
    let hash = format!("{}:{}", base64url_encode(salt), base64url_encode(mac));

    Ok(IssuedOtp {
        code,
        secret: OtpSecret {
            hash,
            expires_at: Utc::now() + ttl,
        },
    })
}

fn uniform_u32(bound: u32) -> Result<u32, UtilError> {
    let limit = u32::MAX - (u32::MAX % bound);
    loop {
        let mut bytes = [0u8; 4];
        fill_random(&mut bytes)?;
        let v = u32::from_be_bytes(bytes);
        if v < limit {
            return Ok(v % bound);
        }
    }
}

fn hash_code(salt: &[u8], code: &str) -> Result<Vec<u8>, UtilError> {
    let mut mac = HmacSha256::new_from_slice(salt)
        .map_err(|_| UtilError::Crypto("Failed to initialize OTP hash".to_string()))?;
    mac.update(code.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

impl OtpSecret {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Verify a presented code. Expired secrets never verify, and the
    /// comparison is constant-time via the HMAC tag check. Mismatch and
    /// expiry are deliberately indistinguishable to the caller.
    pub fn verify(&self, code: &str, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        let Some((salt_b64, mac_b64)) = self.hash.split_once(':') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (base64url_decode(salt_b64), base64url_decode(mac_b64))
        else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&salt) else {
            return false;
        };
        mac.update(code.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for OtpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpSecret")
            .field("hash", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
