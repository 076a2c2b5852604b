//! Payload checksums and Ed25519 record signatures.
//!
//! - **Checksum**: SHA-256 over the canonical JSON of the payload (object keys
//!   sorted recursively, no insignificant whitespace), lowercase hex.
//! - **Signature**: Ed25519 over `"{checksum}:{keyId}:{role}:{timestamp}"`,
//!   base64 encoded (88 chars). `notes` is not part of the signed digest.
//! - **Keys**: base64 of the 32-byte private seed / public key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::core::error::LintError;
use crate::core::record::Signature;
use crate::core::time;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 key length in bytes (seed and public key).
pub const KEY_LEN: usize = 32;

/// Checksum and signing collaborator used by the validator and the fixer.
pub trait SignatureProvider: Send + Sync {
    fn checksum(&self, payload: &JsonValue) -> String;

    fn sign(
        &self,
        payload: &JsonValue,
        private_key: &str,
        key_id: &str,
        role: &str,
        notes: &str,
    ) -> Result<Signature, LintError>;

    fn verify(&self, payload: &JsonValue, signature: &Signature, public_key: &str) -> bool;
}

/// Serialize `value` with object keys sorted at every depth.
pub fn canonical_json_bytes(value: &JsonValue) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut Vec<u8>) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Serializing a string cannot fail.
                out.extend(serde_json::to_vec(key).unwrap_or_default());
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        JsonValue::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend(serde_json::to_vec(scalar).unwrap_or_default()),
    }
}

pub fn payload_checksum(payload: &JsonValue) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json_bytes(payload));
    format!("{:x}", hasher.finalize())
}

fn signed_digest(checksum: &str, key_id: &str, role: &str, timestamp: i64) -> String {
    format!("{}:{}:{}:{}", checksum, key_id, role, timestamp)
}

fn decode_key(encoded: &str, what: &str) -> Result<[u8; KEY_LEN], LintError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| LintError::CryptoError(format!("{} is not valid base64: {}", what, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        LintError::CryptoError(format!(
            "{} must be {} bytes, got {}",
            what,
            KEY_LEN,
            b.len()
        ))
    })
}

pub fn encode_signing_key(key: &SigningKey) -> String {
    BASE64.encode(key.to_bytes())
}

pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    BASE64.encode(key.to_bytes())
}

/// The default provider: SHA-256 checksums and Ed25519 signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Provider;

impl SignatureProvider for Ed25519Provider {
    fn checksum(&self, payload: &JsonValue) -> String {
        payload_checksum(payload)
    }

    fn sign(
        &self,
        payload: &JsonValue,
        private_key: &str,
        key_id: &str,
        role: &str,
        notes: &str,
    ) -> Result<Signature, LintError> {
        let seed = decode_key(private_key, "private key")?;
        let signing_key = SigningKey::from_bytes(&seed);
        let timestamp = time::now_unix_secs();
        let digest = signed_digest(&payload_checksum(payload), key_id, role, timestamp);
        let sig = signing_key.sign(digest.as_bytes());
        Ok(Signature {
            key_id: key_id.to_string(),
            role: role.to_string(),
            notes: notes.to_string(),
            signature: BASE64.encode(sig.to_bytes()),
            timestamp,
        })
    }

    fn verify(&self, payload: &JsonValue, signature: &Signature, public_key: &str) -> bool {
        let Ok(key_bytes) = decode_key(public_key, "public key") else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = BASE64.decode(&signature.signature) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        let digest = signed_digest(
            &payload_checksum(payload),
            &signature.key_id,
            &signature.role,
            signature.timestamp,
        );
        verifying_key.verify(digest.as_bytes(), &sig).is_ok()
    }
}
