//! Stateless opt-out tokens: a truncated HMAC-SHA256 of the lower-cased email.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use drip_core::types::normalize_email;

type HmacSha256 = Hmac<Sha256>;

/// Secret used when none (or a placeholder) is configured.
pub const DEV_FALLBACK_SECRET: &str = "fallback-dev-secret";

/// Hex characters kept from the digest.
pub const TOKEN_LEN: usize = 32;

const PLACEHOLDER_SECRETS: &[&str] = &["changeme", "change-me", "replace-me", "secret"];

/// Generates and verifies unsubscribe tokens with a server-held secret.
#[derive(Clone)]
pub struct UnsubscribeTokens {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UnsubscribeTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeTokens").finish_non_exhaustive()
    }
}

impl UnsubscribeTokens {
    pub fn new(secret: &str) -> Self {
        let trimmed = secret.trim();
        let secret = if trimmed.is_empty()
            || PLACEHOLDER_SECRETS
                .iter()
                .any(|p| trimmed.eq_ignore_ascii_case(p))
        {
            warn!("Unsubscribe secret not configured, using development fallback");
            DEV_FALLBACK_SECRET
        } else {
            trimmed
        };
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Deterministic token for an email address (case-insensitive).
    pub fn generate(&self, email: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(normalize_email(email).as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        digest[..TOKEN_LEN].to_string()
    }

    /// Constant-time comparison against the expected token.
    pub fn verify(&self, email: &str, token: &str) -> bool {
        let expected = self.generate(email);
        let token = token.trim();
        if token.len() != expected.len() {
            return false;
        }
        expected.as_bytes().ct_eq(token.as_bytes()).into()
    }

    /// `<public_url>/unsubscribe?email=..&token=..`
    pub fn unsubscribe_url(&self, public_url: &str, email: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("email", email)
            .append_pair("token", &self.generate(email))
            .finish();
        format!("{}/unsubscribe?{query}", public_url.trim_end_matches('/'))
    }
}

impl Default for UnsubscribeTokens {
    fn default() -> Self {
        Self::new("")
    }
}
