//! Identity keys, input normalization, and the signer capability
//!
//! An identity is a secp256k1 secret scalar plus its derived x-only
//! public key. Key inputs are accepted as 64-char hex, raw 32 bytes, or
//! bech32 (`npub...` / `nsec...`); all three normalize to the canonical
//! byte form. Higher layers never touch raw secret bytes: they hold a
//! [`Signer`] and receive only derived conversation keys.

use crate::cipher::{self, ConversationKey};
use crate::error::{Error, Result};
use crate::event::{Event, UnsignedEvent};
use async_trait::async_trait;
use bech32::{Bech32, Hrp};
use rand::rngs::OsRng;
use secp256k1::{All, Keypair, Message, Parity, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};
use std::sync::OnceLock;
use zeroize::Zeroizing;

const HRP_PUBLIC: &str = "npub";
const HRP_SECRET: &str = "nsec";

static SECP: OnceLock<Secp256k1<All>> = OnceLock::new();

/// Shared secp256k1 context (signing + verification)
pub(crate) fn secp() -> &'static Secp256k1<All> {
    SECP.get_or_init(Secp256k1::new)
}

/// Normalize a public key given as 64-char hex or bech32 `npub1...`.
///
/// Returns the canonical lowercase hex form. Fails with
/// [`Error::Argument`] on any malformed encoding.
pub fn normalize_public_key(input: &str) -> Result<String> {
    let input = input.trim();
    if input.starts_with(HRP_PUBLIC) {
        let bytes = decode_bech32(input, HRP_PUBLIC)?;
        XOnlyPublicKey::from_slice(&bytes)
            .map_err(|e| Error::Argument(format!("invalid public key: {e}")))?;
        return Ok(hex::encode(bytes));
    }
    if input.len() != 64 || !input.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Argument(format!(
            "public key must be 64 hex chars or npub, got {} chars",
            input.len()
        )));
    }
    let lower = input.to_ascii_lowercase();
    // Must be a valid curve point, not just well-formed hex
    parse_public_key(&lower)?;
    Ok(lower)
}

/// Parse a normalized hex public key into an x-only key.
pub fn parse_public_key(hex_pk: &str) -> Result<XOnlyPublicKey> {
    let bytes = hex::decode(hex_pk)
        .map_err(|e| Error::Argument(format!("invalid public key hex: {e}")))?;
    XOnlyPublicKey::from_slice(&bytes)
        .map_err(|e| Error::Argument(format!("invalid public key: {e}")))
}

/// Encode an x-only public key as bech32 `npub1...`.
pub fn encode_npub(pk: &XOnlyPublicKey) -> Result<String> {
    encode_bech32(HRP_PUBLIC, &pk.serialize())
}

fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| Error::Internal(format!("bad hrp: {e}")))?;
    bech32::encode::<Bech32>(hrp, data)
        .map_err(|e| Error::Internal(format!("bech32 encode failed: {e}")))
}

fn decode_bech32(input: &str, expected_hrp: &str) -> Result<Vec<u8>> {
    let (hrp, data) =
        bech32::decode(input).map_err(|e| Error::Argument(format!("invalid bech32: {e}")))?;
    let expected =
        Hrp::parse(expected_hrp).map_err(|e| Error::Internal(format!("bad hrp: {e}")))?;
    if hrp != expected {
        return Err(Error::Argument(format!(
            "expected {expected_hrp} prefix, got {hrp}"
        )));
    }
    if data.len() != 32 {
        return Err(Error::Argument(format!(
            "expected 32 bytes of key data, got {}",
            data.len()
        )));
    }
    Ok(data)
}

/// In-memory identity: a secret scalar and its derived x-only public key
///
/// Created once and never mutated. Also the local [`Signer`]
/// implementation.
#[derive(Clone)]
pub struct Keys {
    secret: SecretKey,
    keypair: Keypair,
    public: XOnlyPublicKey,
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keys({})", self.public_key_hex())
    }
}

impl Keys {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret)
    }

    /// Build from an existing secret key
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let keypair = Keypair::from_secret_key(secp(), &secret);
        let (public, _parity) = keypair.x_only_public_key();
        Self {
            secret,
            keypair,
            public,
        }
    }

    /// Build from 32 raw secret bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| Error::Argument(format!("invalid secret key: {e}")))?;
        Ok(Self::from_secret_key(secret))
    }

    /// Parse a secret key given as 64-char hex or bech32 `nsec1...`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.starts_with(HRP_SECRET) {
            let bytes = Zeroizing::new(decode_bech32(input, HRP_SECRET)?);
            return Self::from_secret_bytes(&bytes);
        }
        if input.len() % 2 != 0 || !input.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Argument("secret key must be hex or nsec".into()));
        }
        let bytes = Zeroizing::new(
            hex::decode(input).map_err(|e| Error::Argument(format!("invalid hex: {e}")))?,
        );
        Self::from_secret_bytes(&bytes)
    }

    /// X-only public key
    pub fn public_key(&self) -> XOnlyPublicKey {
        self.public
    }

    /// Lowercase hex form of the public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// bech32 `npub1...` form of the public key
    pub fn npub(&self) -> Result<String> {
        encode_npub(&self.public)
    }

    /// bech32 `nsec1...` form of the secret key
    pub fn nsec(&self) -> Result<String> {
        encode_bech32(HRP_SECRET, &self.secret.secret_bytes())
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Sign a 32-byte digest with BIP-340 Schnorr
    pub fn sign_digest(&self, digest: [u8; 32]) -> secp256k1::schnorr::Signature {
        let msg = Message::from_digest(digest);
        secp().sign_schnorr(&msg, &self.keypair)
    }
}

/// Lift an x-only key to a full point (even parity, per BIP-340)
pub(crate) fn full_point(pk: &XOnlyPublicKey) -> PublicKey {
    PublicKey::from_x_only_public_key(*pk, Parity::Even)
}

/// Signing capability consumed by the event codec and the publisher
///
/// Implementations hold the secret material; callers only ever see the
/// public key, signed events, and derived conversation keys. The local
/// implementation is [`Keys`]; the methods are async so a remote
/// (bunker-style) signer can satisfy the same contract.
#[async_trait]
pub trait Signer: Send + Sync {
    /// X-only public key of this identity
    fn public_key(&self) -> XOnlyPublicKey;

    /// Finalize and sign an event template
    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event>;

    /// Symmetric conversation key shared with `peer`
    async fn conversation_key(&self, peer: &XOnlyPublicKey) -> Result<ConversationKey>;
}

#[async_trait]
impl Signer for Keys {
    fn public_key(&self) -> XOnlyPublicKey {
        self.public
    }

    async fn sign_event(&self, unsigned: UnsignedEvent) -> Result<Event> {
        let (id_hex, digest) = unsigned.id()?;
        let sig = self.sign_digest(digest);
        Ok(unsigned.into_signed(id_hex, hex::encode(sig.serialize())))
    }

    async fn conversation_key(&self, peer: &XOnlyPublicKey) -> Result<ConversationKey> {
        cipher::conversation_key(&self.secret, peer)
    }
}
