use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::Utc;
use serde::Deserialize;

use htb_core::{HtbError, Result};

/// URL-safe decoder that accepts both padded and unpadded segments
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: f64,
}

/// Check whether a JWT access token has expired
///
/// Decode failures are errors rather than "not expired".
pub fn is_expired(token: &str) -> Result<bool> {
    is_expired_at(token, Utc::now().timestamp())
}

/// Check a JWT's `exp` claim against the given Unix timestamp
pub fn is_expired_at(token: &str, now: i64) -> Result<bool> {
    Ok(now as f64 > expiry(token)?)
}

/// Read the `exp` claim from a JWT
pub fn expiry(token: &str) -> Result<f64> {
    let segment = token
        .split('.')
        .nth(1)
        .ok_or_else(|| HtbError::InvalidToken("missing payload segment".to_string()))?;

    // Some issuers use the standard alphabet; fold it onto the URL-safe one
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    let payload = PAYLOAD_ENGINE
        .decode(normalized)
        .map_err(|e| HtbError::InvalidToken(format!("payload is not base64: {}", e)))?;
    let claim: ExpiryClaim = serde_json::from_slice(&payload)
        .map_err(|e| HtbError::InvalidToken(format!("payload has no usable exp claim: {}", e)))?;

    Ok(claim.exp)
}
