//! Push notification authentication and branch filtering.
//!
//! Signatures follow the GitHub convention: `X-Hub-Signature-256` carries
//! `sha256=<lowercase hex HMAC-SHA256 of the raw body>`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// What the webhook endpoint should do with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDecision {
    /// Signature check failed.
    Unauthorized,
    /// Authenticated, but the push was for another branch.
    Ignored,
    /// Authenticated and relevant; request a build.
    Accepted,
}

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(default, rename = "ref")]
    git_ref: String,
}

/// Check `header` against the HMAC-SHA256 of `body` under `secret`.
///
/// An empty secret disables verification. Comparison is constant time.
pub fn verify_signature(secret: &str, header: Option<&str>, body: &[u8]) -> bool {
    if secret.is_empty() {
        return true;
    }

    let Some(hex_sig) = header.and_then(|h| h.strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Whether a push payload concerns `branch_ref` (`refs/heads/<branch>`).
///
/// A body that cannot be decoded is accepted so that a malformed
/// notification still leads to a build.
pub fn should_trigger(body: &[u8], branch_ref: &str) -> bool {
    match serde_json::from_slice::<PushEvent>(body) {
        Ok(event) => event.git_ref == branch_ref,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable webhook payload, building anyway");
            true
        }
    }
}

/// Authenticate then filter one delivery.
pub fn evaluate(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    branch_ref: &str,
) -> WebhookDecision {
    if !verify_signature(secret, header, body) {
        WebhookDecision::Unauthorized
    } else if !should_trigger(body, branch_ref) {
        WebhookDecision::Ignored
    } else {
        WebhookDecision::Accepted
    }
}

/// `sha256=<hex>` signature for `body`, as a sender would compute it.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    ))
}
