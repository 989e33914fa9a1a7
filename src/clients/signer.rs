//! Time-limited signed download URLs for stored media.
//!
//! A URL has the form `<base>/<object_key>?expires=<unix>&signature=<hex>`
//! where the signature is SHA-256 over the signing key, object key and
//! expiry, enveloped by the key on both sides.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::HiveError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UrlSigner {
    base_url: String,
    key: String,
}

impl UrlSigner {
    pub fn new(base_url: impl Into<String>, key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.unwrap_or_default(),
        }
    }

    /// Sign `object_key` so it stays valid for `ttl_secs` after `now`.
    pub fn sign(
        &self,
        object_key: &str,
        ttl_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl, HiveError> {
        let expires_at = TimeDelta::try_seconds(ttl_secs)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| HiveError::Config(format!("URL lifetime out of range: {ttl_secs}s")))?;
        let expires = expires_at.timestamp();
        let signature = self.signature(object_key, expires);
        Ok(SignedUrl {
            url: format!(
                "{}/{}?expires={}&signature={}",
                self.base_url,
                object_key.trim_start_matches('/'),
                expires,
                signature
            ),
            // Round-trip through the unix timestamp so the stored expiry
            // matches the one in the URL.
            expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(expires_at),
        })
    }

    fn signature(&self, object_key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(b"\n");
        hasher.update(object_key.trim_start_matches('/').as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        url.split(['?', '&'])
            .find_map(|kv| kv.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    /// Accepts a URL's signature while it has not yet expired.
    fn verify(signer: &UrlSigner, object_key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        expires > now.timestamp()
            && constant_time_eq(signer.signature(object_key, expires).as_bytes(), signature.as_bytes())
    }

    #[test]
    fn test_signed_url_shape_and_expiry() {
        let signer = UrlSigner::new("https://media.test/", Some("secret".into()));
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let signed = signer.sign("screenshots/1/a.png", 3600, now).unwrap();

        assert!(signed.url.starts_with("https://media.test/screenshots/1/a.png?expires="));
        assert_eq!(signed.expires_at, now + TimeDelta::hours(1));
        assert_eq!(
            query_param(&signed.url, "expires"),
            signed.expires_at.timestamp().to_string()
        );
        assert_eq!(query_param(&signed.url, "signature").len(), 64);
    }

    #[test]
    fn test_signature_holds_until_expiry() {
        let signer = UrlSigner::new("https://media.test", Some("secret".into()));
        let now = Utc::now();
        let signed = signer.sign("k.png", 60, now).unwrap();
        let expires: i64 = query_param(&signed.url, "expires").parse().unwrap();
        let sig = query_param(&signed.url, "signature");

        assert!(verify(&signer, "k.png", expires, sig, now));
        assert!(!verify(&signer, "k.png", expires, sig, now + TimeDelta::seconds(61)));
        assert!(!verify(&signer, "other.png", expires, sig, now));
    }

    #[test]
    fn test_signature_depends_on_key() {
        let now = Utc::now();
        let a = UrlSigner::new("https://media.test", Some("one".into())).sign("k", 60, now).unwrap();
        let b = UrlSigner::new("https://media.test", Some("two".into())).sign("k", 60, now).unwrap();
        assert_ne!(query_param(&a.url, "signature"), query_param(&b.url, "signature"));
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        let signer = UrlSigner::new("https://media.test", Some("secret".into()));
        let now = Utc::now();
        assert!(matches!(signer.sign("k", 0, now), Err(HiveError::Config(_))));
        assert!(matches!(signer.sign("k", -5, now), Err(HiveError::Config(_))));
        assert!(matches!(signer.sign("k", i64::MAX, now), Err(HiveError::Config(_))));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }
}
