use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex SHA-256 of a request body.
pub fn body_digest(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Lowercase hex HMAC-SHA256 of `payload` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(payload.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Sign an outbound request whose string-to-sign is the colon-joined
/// `parts`, with the body digest in place of the raw body.
///
/// Format: HMAC-SHA256(part_0:...:part_n, secret), where callers pass the
/// body digest as one of the parts.
pub fn sign_parts(secret: &str, parts: &[&str]) -> Result<String, anyhow::Error> {
    hmac_sha256_hex(secret, &parts.join(":"))
}
