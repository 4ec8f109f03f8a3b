//! `Stripe-Signature` verification.
//!
//! The header carries a unix timestamp and one or more hex HMAC-SHA256
//! signatures: `t=1700000000,v1=5257a8...,v1=...`. The signed payload is
//! `"{t}.{raw_body}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, ServiceError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                // Unparseable hex is skipped; another v1 may still match.
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| ServiceError::Authenticity("signature header has no timestamp".into()))?;
        if signatures.is_empty() {
            return Err(ServiceError::Authenticity(
                "signature header has no v1 signature".into(),
            ));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid webhook key: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a header value the verifier accepts. Used for replaying events
/// locally and by tests.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, ServiceError> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs,
        }
    }

    /// Checks `header` against the raw request body at time `now`.
    ///
    /// Fails closed: no secret, no header, a stale timestamp or no matching
    /// signature are all authenticity errors.
    pub fn verify(&self, header: Option<&str>, payload: &[u8], now: i64) -> Result<(), ServiceError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| ServiceError::Authenticity("webhook secret is not configured".into()))?;
        let header = header
            .ok_or_else(|| ServiceError::Authenticity("missing signature header".into()))?;
        let parsed = SignatureHeader::parse(header)?;

        if now.abs_diff(parsed.timestamp) > self.tolerance_secs {
            return Err(ServiceError::Authenticity(
                "signature timestamp outside tolerance".into(),
            ));
        }

        let mac = mac_for(secret, parsed.timestamp, payload)?;
        let matched = parsed
            .signatures
            .iter()
            .any(|sig| mac.clone().verify_slice(sig).is_ok());

        if matched {
            Ok(())
        } else {
            Err(ServiceError::Authenticity("signature mismatch".into()))
        }
    }
}
