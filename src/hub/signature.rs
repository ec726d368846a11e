use ring::hmac;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SignatureError {
    #[error("notification is not signed")]
    Missing,
    #[error("malformed signature header {0:?}")]
    Malformed(String),
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("signature does not match body")]
    Mismatch,
}

fn algorithm(name: &str) -> Option<hmac::Algorithm> {
    match name.to_ascii_lowercase().as_str() {
        "sha1" => Some(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY),
        "sha256" => Some(hmac::HMAC_SHA256),
        "sha384" => Some(hmac::HMAC_SHA384),
        "sha512" => Some(hmac::HMAC_SHA512),
        _ => None,
    }
}

/// Check an `X-Hub-Signature: <algo>=<hex digest>` header against the body.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?.trim();
    let (name, digest) = header
        .split_once('=')
        .ok_or_else(|| SignatureError::Malformed(header.to_string()))?;
    let algorithm =
        algorithm(name).ok_or_else(|| SignatureError::UnsupportedAlgorithm(name.to_string()))?;
    let tag = hex::decode(digest).map_err(|_| SignatureError::Malformed(header.to_string()))?;

    let key = hmac::Key::new(algorithm, secret.as_bytes());
    hmac::verify(&key, body, &tag).map_err(|_| SignatureError::Mismatch)
}

/// Header value a hub would send for `body`.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret.as_bytes());
    format!("sha1={}", hex::encode(hmac::sign(&key, body).as_ref()))
}
