//! Locator event codec
//!
//! Locator records travel as parameterized replaceable events of kind
//! 30058. This module builds them (in four encryption modes), verifies
//! them, and opens their content back into payload bytes. The canonical
//! form hashed into the event id is the compact JSON array
//! `[0, pubkey, created_at, kind, tags, content]`; the signature is
//! BIP-340 Schnorr over that SHA-256 digest.
//!
//! Endpoint data MUST never appear in tags: tags are visible to every
//! relay, content is not (except in public mode, which is explicit).

use crate::cipher;
use crate::error::{Error, Result};
use crate::keys::{self, Keys, Signer};
use rand::rngs::OsRng;
use secp256k1::schnorr::Signature;
use secp256k1::{Message, SecretKey, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Parameterized replaceable event kind carrying a locator record
pub const LOCATOR_KIND: u16 = 30058;

/// Replaceable event kind carrying a peer's advertised relay list
pub const RELAY_LIST_KIND: u16 = 10002;

/// Record name used when the caller does not supply one
pub const DEFAULT_IDENTIFIER: &str = "addr";

/// Tag holding the record identifier (the replaceability parameter)
pub const TAG_IDENTIFIER: &str = "d";
/// Tag holding an absolute expiry, hardening revocation
pub const TAG_EXPIRATION: &str = "expiration";
/// Tag marking a locator as non-discoverable by non-targets
pub const TAG_PRIVATE: &str = "private";
/// Tag holding one relay URL in a relay-list record
pub const TAG_RELAY: &str = "r";

/// A signed wire event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// SHA-256 of the canonical serialization, lowercase hex
    pub id: String,
    /// Author x-only public key, lowercase hex
    pub pubkey: String,
    /// Unix seconds at creation; mutating this invalidates `sig`
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// BIP-340 Schnorr signature over `id`, hex
    pub sig: String,
}

/// Event fields prior to id computation and signing
#[derive(Clone, Debug)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    /// Canonical id: hex string plus the raw digest that gets signed
    pub fn id(&self) -> Result<(String, [u8; 32])> {
        let canonical = serde_json::to_vec(&(
            0u8,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
        .map_err(|e| Error::Internal(e.to_string()))?;
        let digest: [u8; 32] = Sha256::digest(&canonical).into();
        Ok((hex::encode(digest), digest))
    }

    pub fn into_signed(self, id: String, sig: String) -> Event {
        Event {
            id,
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        }
    }
}

impl Event {
    /// Verify the event id and signature.
    ///
    /// Recomputes the id from the canonical serialization, checks it
    /// against the transmitted one, and verifies the Schnorr signature
    /// under the claimed author key. Any mismatch rejects the event.
    pub fn verify(&self) -> Result<()> {
        let unsigned = UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        };
        let (expected_id, digest) = unsigned.id()?;
        if expected_id != self.id.to_ascii_lowercase() {
            return Err(Error::Argument(format!(
                "event id mismatch: computed {expected_id}, transmitted {}",
                self.id
            )));
        }

        let pubkey = keys::parse_public_key(&self.pubkey)?;
        let sig_bytes = hex::decode(&self.sig)
            .map_err(|e| Error::Argument(format!("invalid signature hex: {e}")))?;
        let sig = Signature::from_slice(&sig_bytes)
            .map_err(|e| Error::Argument(format!("invalid signature: {e}")))?;

        keys::secp()
            .verify_schnorr(&sig, &Message::from_digest(digest), &pubkey)
            .map_err(|_| Error::Argument("signature verification failed".into()))
    }

    /// First value of the first tag named `name`
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().is_some_and(|n| n == name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// Values of every tag named `name`
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.tags
            .iter()
            .filter(move |t| t.first().is_some_and(|n| n == name))
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    /// Record identifier (`d` tag)
    pub fn identifier(&self) -> Option<&str> {
        self.tag_value(TAG_IDENTIFIER)
    }

    /// Explicit expiry, if the tag is present and parses
    pub fn expiration(&self) -> Option<u64> {
        self.tag_value(TAG_EXPIRATION).and_then(|v| v.parse().ok())
    }
}

/// Sort newest-first with the deterministic tie-break: descending
/// `created_at`, then ascending id, so equal timestamps resolve to the
/// lexicographically smaller id.
pub fn sort_newest_first(events: &mut [Event]) {
    events.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Content encryption mode for a locator event
#[derive(Clone, Debug)]
pub enum EncryptMode {
    /// Content is the payload JSON in the clear
    Plain,
    /// Sealed under the publisher's self-conversation key
    ToSelf,
    /// Sealed under the conversation key with one peer
    ToPeer(XOnlyPublicKey),
    /// One ciphertext under a fresh session key, wrapped per recipient
    Wrapped(Vec<XOnlyPublicKey>),
}

/// Non-content knobs for event construction
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    /// Add `["private","true"]`, marking the locator non-discoverable
    /// by non-targets
    pub private: bool,
    /// Add `["expiration", <epoch>]`
    pub expiration: Option<u64>,
}

/// Multi-recipient content container
///
/// `ciphertext` holds the payload sealed under a random session key;
/// `wraps` maps each recipient public key (hex) to that session key
/// sealed under the publisher↔recipient conversation key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WrappedContent {
    pub ciphertext: String,
    pub wraps: BTreeMap<String, String>,
}

/// Shape-check `content` for the wrapped container.
///
/// Requires a JSON object with a string `ciphertext` and an object
/// `wraps` — stricter than the historical substring probe, but any
/// producer the substring probe accepted also passes here, so the wire
/// stays compatible.
pub fn parse_wrapped(content: &str) -> Option<WrappedContent> {
    if !content.trim_start().starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(content).ok()?;
    let obj = value.as_object()?;
    if !obj.get("ciphertext").is_some_and(Value::is_string) {
        return None;
    }
    if !obj.get("wraps").is_some_and(Value::is_object) {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Build and sign a locator event.
///
/// `payload` is the encoded payload JSON; `created_at` is the
/// publisher's clock in Unix seconds. Can fail with
/// [`Error::Argument`] (bad recipient set) or whatever the signer
/// surfaces.
pub async fn build_locator(
    signer: &dyn Signer,
    payload: &[u8],
    identifier: &str,
    mode: &EncryptMode,
    created_at: u64,
    options: &BuildOptions,
) -> Result<Event> {
    let content = match mode {
        EncryptMode::Plain => String::from_utf8(payload.to_vec())
            .map_err(|_| Error::Argument("public payload must be UTF-8".into()))?,
        EncryptMode::ToSelf => {
            let key = signer.conversation_key(&signer.public_key()).await?;
            cipher::encrypt(&key, payload)?
        }
        EncryptMode::ToPeer(peer) => {
            let key = signer.conversation_key(peer).await?;
            cipher::encrypt(&key, payload)?
        }
        EncryptMode::Wrapped(recipients) => {
            if recipients.is_empty() {
                return Err(Error::Argument("wrapped mode requires recipients".into()));
            }
            wrap_content(signer, payload, recipients).await?
        }
    };

    let mut tags = vec![vec![TAG_IDENTIFIER.to_string(), identifier.to_string()]];
    if options.private {
        tags.push(vec![TAG_PRIVATE.to_string(), "true".to_string()]);
    }
    if let Some(expiration) = options.expiration {
        tags.push(vec![TAG_EXPIRATION.to_string(), expiration.to_string()]);
    }

    let unsigned = UnsignedEvent {
        pubkey: hex::encode(signer.public_key().serialize()),
        created_at,
        kind: LOCATOR_KIND,
        tags,
        content,
    };
    signer.sign_event(unsigned).await
}

/// Seal `payload` once under a fresh session key and wrap that key for
/// each recipient.
async fn wrap_content(
    signer: &dyn Signer,
    payload: &[u8],
    recipients: &[XOnlyPublicKey],
) -> Result<String> {
    let session = Keys::from_secret_key(SecretKey::new(&mut OsRng));
    let inner_key = cipher::conversation_key(session.secret_key(), &session.public_key())?;
    let ciphertext = cipher::encrypt(&inner_key, payload)?;

    // Short-lived; wiped as soon as the wraps are sealed
    let session_hex = Zeroizing::new(hex::encode(session.secret_key().secret_bytes()));

    let mut wraps = BTreeMap::new();
    for recipient in recipients {
        let wrap_key = signer.conversation_key(recipient).await?;
        wraps.insert(
            hex::encode(recipient.serialize()),
            cipher::encrypt(&wrap_key, session_hex.as_bytes())?,
        );
    }

    serde_json::to_string(&WrappedContent { ciphertext, wraps })
        .map_err(|e| Error::Internal(e.to_string()))
}

/// Open a locator event's content into payload bytes.
///
/// Mode detection, in order: wrapped container (JSON shape check),
/// sealed string when a signer is available, plaintext otherwise.
/// Returns `Ok(None)` when the content is wrapped and the caller is not
/// among the recipients; that is not an error. Decryption and container
/// parse failures surface as [`Error::Decryption`].
pub async fn open_locator(event: &Event, signer: Option<&dyn Signer>) -> Result<Option<Vec<u8>>> {
    if let Some(wrapped) = parse_wrapped(&event.content) {
        let Some(signer) = signer else {
            return Ok(None);
        };
        let me = hex::encode(signer.public_key().serialize());
        let Some(wrap) = wrapped.wraps.get(&me) else {
            return Ok(None);
        };

        let author = keys::parse_public_key(&event.pubkey)?;
        let wrap_key = signer.conversation_key(&author).await?;
        let session_hex = Zeroizing::new(cipher::decrypt(&wrap_key, wrap)?);
        let session_bytes = Zeroizing::new(
            hex::decode(session_hex.as_slice())
                .map_err(|e| Error::Decryption(format!("malformed session key: {e}")))?,
        );
        let session = Keys::from_secret_bytes(&session_bytes)
            .map_err(|e| Error::Decryption(format!("invalid session key: {e}")))?;

        let inner_key = cipher::conversation_key(session.secret_key(), &session.public_key())?;
        return cipher::decrypt(&inner_key, &wrapped.ciphertext).map(Some);
    }

    if let Some(signer) = signer {
        if !event.content.trim_start().starts_with('{') {
            let author = keys::parse_public_key(&event.pubkey)?;
            let key = signer.conversation_key(&author).await?;
            return cipher::decrypt(&key, &event.content).map(Some);
        }
    }

    Ok(Some(event.content.clone().into_bytes()))
}
