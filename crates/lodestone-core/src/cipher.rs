//! Authenticated symmetric channel keyed by ECDH conversation keys
//!
//! Two identities share a conversation key derived from the x-coordinate
//! of their ECDH shared point, expanded through HKDF-SHA256 with a
//! domain-separation salt. Content is sealed with ChaCha20-Poly1305 and
//! carried as `base64(version || nonce || ciphertext)` — a string that
//! can never begin with `{`, which keeps encrypted content syntactically
//! distinct from plaintext JSON payloads.

use crate::error::{Error, Result};
use crate::keys::full_point;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{SecretKey, XOnlyPublicKey};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain prefix for conversation-key derivation
const DOMAIN_CONVERSATION: &[u8] = b"lodestone-conversation-v1";

/// Sealed-content format version
const SEAL_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;

/// 32-byte symmetric key shared between two identities
///
/// Derived material only; zeroized on drop. Higher layers receive this
/// instead of raw secret scalars.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ConversationKey([u8; 32]);

impl ConversationKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs
        write!(f, "ConversationKey(..)")
    }
}

/// Derive the conversation key between `secret` and `peer`.
///
/// `key = HKDF-SHA256(salt = domain, ikm = x(ECDH(secret, peer)))`
///
/// The x-coordinate alone makes the derivation symmetric regardless of
/// either key's parity.
pub fn conversation_key(secret: &SecretKey, peer: &XOnlyPublicKey) -> Result<ConversationKey> {
    let point = secp256k1::ecdh::shared_secret_point(&full_point(peer), secret);
    let hk = Hkdf::<Sha256>::new(Some(DOMAIN_CONVERSATION), &point[..32]);
    let mut okm = [0u8; 32];
    hk.expand(b"conversation", &mut okm)
        .map_err(|_| Error::Internal("conversation key derivation failed".into()))?;
    Ok(ConversationKey(okm))
}

/// Seal plaintext under a conversation key.
///
/// Output is `base64(version || nonce || aead_ciphertext)`.
pub fn encrypt(key: &ConversationKey, plaintext: &[u8]) -> Result<String> {
    let cipher = ChaCha20Poly1305::new_from_slice(&key.0)
        .map_err(|_| Error::Internal("invalid cipher key length".into()))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::Internal("encryption failed".into()))?;

    let mut framed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    framed.push(SEAL_VERSION);
    framed.extend_from_slice(&nonce);
    framed.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(framed))
}

/// Open sealed content with a conversation key.
///
/// Fails with [`Error::Decryption`] on malformed framing, an unknown
/// version, or an authentication failure (wrong key or tampered data).
pub fn decrypt(key: &ConversationKey, content: &str) -> Result<Vec<u8>> {
    let framed = BASE64
        .decode(content.trim())
        .map_err(|e| Error::Decryption(format!("invalid ciphertext encoding: {e}")))?;

    if framed.len() < 1 + NONCE_LEN + 16 {
        return Err(Error::Decryption("ciphertext too short".into()));
    }
    if framed[0] != SEAL_VERSION {
        return Err(Error::Decryption(format!(
            "unsupported seal version {}",
            framed[0]
        )));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(&key.0)
        .map_err(|_| Error::Internal("invalid cipher key length".into()))?;

    let nonce = Nonce::from_slice(&framed[1..1 + NONCE_LEN]);
    cipher
        .decrypt(nonce, &framed[1 + NONCE_LEN..])
        .map_err(|_| Error::Decryption("authentication failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keys;

    fn shared_key() -> ConversationKey {
        let a = Keys::generate();
        let b = Keys::generate();
        conversation_key(a.secret_key(), &b.public_key()).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = shared_key();
        let plaintext = b"{\"v\":1,\"ttl\":600}";

        let sealed = encrypt(&key, plaintext).unwrap();
        assert!(!sealed.starts_with('{'));

        let opened = decrypt(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = shared_key();
        let other = shared_key();

        let sealed = encrypt(&key, b"secret").unwrap();
        let err = decrypt(&other, &sealed).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = shared_key();
        let sealed = encrypt(&key, b"secret").unwrap();

        let mut framed = BASE64.decode(&sealed).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xff;
        let tampered = BASE64.encode(framed);

        assert!(matches!(
            decrypt(&key, &tampered),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_malformed_content_fails() {
        let key = shared_key();
        assert!(matches!(
            decrypt(&key, "not base64 !!!"),
            Err(Error::Decryption(_))
        ));
        assert!(matches!(decrypt(&key, "AAAA"), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_nonces_differ_between_seals() {
        let key = shared_key();
        let a = encrypt(&key, b"same plaintext").unwrap();
        let b = encrypt(&key, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }
}
