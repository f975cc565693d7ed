//! HMAC signatures GitHub puts in `X-Hub-Signature-256` / `X-Hub-Signature`

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use tracing::debug;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// Legacy `X-Hub-Signature`
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn prefix(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1=",
            SignatureAlgorithm::Sha256 => "sha256=",
        }
    }

    /// Splits `sha256=<hex>` into its algorithm and hex digest.
    pub fn split(signature: &str) -> Option<(Self, &str)> {
        if let Some(hex) = signature.strip_prefix(SignatureAlgorithm::Sha256.prefix()) {
            return Some((SignatureAlgorithm::Sha256, hex));
        }
        signature
            .strip_prefix(SignatureAlgorithm::Sha1.prefix())
            .map(|hex| (SignatureAlgorithm::Sha1, hex))
    }
}

fn keyed<M: Mac + KeyInit>(secret: &str, payload: &[u8]) -> Option<M> {
    let mut mac = <M as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(mac)
}

/// Signs `payload` the way GitHub does, returning `"<prefix><hex digest>"`.
pub fn sign(secret: &str, algorithm: SignatureAlgorithm, payload: &[u8]) -> Option<String> {
    let digest = match algorithm {
        SignatureAlgorithm::Sha1 => {
            hex::encode(keyed::<HmacSha1>(secret, payload)?.finalize().into_bytes())
        }
        SignatureAlgorithm::Sha256 => {
            hex::encode(keyed::<HmacSha256>(secret, payload)?.finalize().into_bytes())
        }
    };
    Some(format!("{}{}", algorithm.prefix(), digest))
}

/// Verifies a signature header value against the raw payload.
///
/// The algorithm is taken from the header's prefix. Digest comparison is
/// constant-time.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some((algorithm, hex_signature)) = SignatureAlgorithm::split(signature) else {
        debug!("Signature has no known algorithm prefix");
        return false;
    };

    let signature_bytes = match hex::decode(hex_signature) {
        Ok(bytes) => bytes,
        Err(_) => {
            debug!("Signature is not valid hex");
            return false;
        }
    };

    match algorithm {
        SignatureAlgorithm::Sha1 => keyed::<HmacSha1>(secret, payload)
            .map(|mac| mac.verify_slice(&signature_bytes).is_ok()),
        SignatureAlgorithm::Sha256 => keyed::<HmacSha256>(secret, payload)
            .map(|mac| mac.verify_slice(&signature_bytes).is_ok()),
    }
    .unwrap_or(false)
}

/// True when any of the configured secrets produced the signature.
pub fn verify_any<S: AsRef<str>>(secrets: &[S], payload: &[u8], signature: &str) -> bool {
    secrets
        .iter()
        .any(|secret| verify(secret.as_ref(), payload, signature))
}
