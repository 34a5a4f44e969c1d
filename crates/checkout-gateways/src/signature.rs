//! HMAC-SHA256 webhook signatures
//!
//! Used by Coinbase Commerce (`X-CC-Webhook-Signature`) and the generic
//! notification endpoint (`X-Checkout-Signature`). Signatures are the hex
//! digest of the raw request body.

use checkout_core::{CheckoutError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body`
pub fn sign_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex HMAC-SHA256 signature in constant time
pub fn verify_hex(secret: &str, body: &[u8], signature: &str) -> Result<()> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| CheckoutError::WebhookSignature("signature is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::WebhookSignature(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| CheckoutError::WebhookSignature("signature mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_own_signature() {
        let body = br#"{"payment_id":7,"state":"rejected"}"#;
        let signature = sign_hex("whsec", body);
        assert_eq!(signature.len(), 64);
        assert!(verify_hex("whsec", body, &signature).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signature = sign_hex("whsec", b"payload");
        assert!(matches!(
            verify_hex("whsec", b"tampered", &signature),
            Err(CheckoutError::WebhookSignature(_))
        ));
        assert!(verify_hex("other", b"payload", &signature).is_err());
        assert!(verify_hex("whsec", b"payload", "not-hex").is_err());
    }
}
