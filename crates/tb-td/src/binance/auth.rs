//! Binance request signing.
//!
//! Signed endpoints take an HMAC-SHA256 over the URL-encoded query string,
//! appended as `&signature=<hex>`. The key is set up once when the gateway
//! is built; every request signs with a clone of the keyed MAC.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct RequestSigner {
    mac: HmacSha256,
}

impl RequestSigner {
    /// Returns `None` only if the MAC rejects the key, which HMAC never does.
    pub fn new(secret: &str) -> Option<Self> {
        HmacSha256::new_from_slice(secret.as_bytes()).ok().map(|mac| Self { mac })
    }

    /// Lowercase hex HMAC-SHA256 of `message`.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// URL-encode `params` in order, then append the signature.
    pub fn signed_query(&self, params: &[(&str, String)]) -> String {
        let query = encode_query(params);
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }
}

pub fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
