//! Locator payload codec
//!
//! The payload is the logical locator document: a versioned, TTL-scoped
//! list of reachable endpoints. Encoding is plain JSON with explicit
//! field presence; unknown fields are preserved verbatim so records
//! produced by newer revisions survive a re-encode.

use crate::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Payload format version emitted by this implementation
pub const PAYLOAD_VERSION: u32 = 1;

/// Priority assumed for endpoints that do not state one
pub const DEFAULT_PRIORITY: u32 = 1000;

/// One reachable address for an identity
///
/// `url` is canonical on output; `uri` is accepted on input (older
/// producers used that name). IPv6 literals use bracket notation with a
/// port.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoint {
    /// Transport tag: `"tcp"`, `"udp"`, `"http"`, `"ws"`, or free string
    pub transport: String,
    /// Address as a URL/URI string
    pub url: String,
    /// Lower is preferred; absent is treated as [`DEFAULT_PRIORITY`]
    pub priority: Option<u32>,
    /// `"ipv4"`, `"ipv6"`, `"onion"`, or free string
    pub family: Option<String>,
    /// Transport key fingerprint
    pub key_fingerprint: Option<String>,
    /// Unknown fields, carried through re-encodes
    pub extra: Map<String, Value>,
}

impl Endpoint {
    pub fn new(transport: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            url: url.into(),
            priority: None,
            family: None,
            key_fingerprint: None,
            extra: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// Effective priority for ordering
    pub fn priority_or_default(&self) -> u32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

// Hand-rolled serde: `uri` must alias `url` on input and every unknown
// key must land in `extra`, which derive(flatten) does not combine with
// aliases.
impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = Map::new();
        map.insert("type".into(), Value::String(self.transport.clone()));
        map.insert("url".into(), Value::String(self.url.clone()));
        if let Some(priority) = self.priority {
            map.insert("priority".into(), Value::from(priority));
        }
        if let Some(family) = &self.family {
            map.insert("family".into(), Value::String(family.clone()));
        }
        if let Some(k) = &self.key_fingerprint {
            map.insert("k".into(), Value::String(k.clone()));
        }
        for (key, value) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut map = Map::deserialize(deserializer)?;

        let transport = match map.remove("type") {
            Some(Value::String(s)) => s,
            Some(_) => return Err(D::Error::custom("endpoint `type` must be a string")),
            None => return Err(D::Error::custom("endpoint missing `type`")),
        };
        let url = match map.remove("url").or_else(|| map.remove("uri")) {
            Some(Value::String(s)) => s,
            Some(_) => return Err(D::Error::custom("endpoint `url` must be a string")),
            None => return Err(D::Error::custom("endpoint missing `url`")),
        };
        let priority = match map.remove("priority") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|p| u32::try_from(p).ok())
                    .ok_or_else(|| {
                        D::Error::custom("endpoint `priority` must be a non-negative integer")
                    })?,
            ),
        };
        let family = match map.remove("family") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(D::Error::custom("endpoint `family` must be a string")),
        };
        let key_fingerprint = match map.remove("k") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(_) => return Err(D::Error::custom("endpoint `k` must be a string")),
        };

        Ok(Endpoint {
            transport,
            url,
            priority,
            family,
            key_fingerprint,
            extra: map,
        })
    }
}

/// The logical locator document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Format version, `>= 1`
    pub v: u32,
    /// Freshness window length in seconds
    pub ttl: u64,
    /// Publisher-clock Unix seconds of the last update
    pub updated_at: u64,
    /// Reachable endpoints, most preferred first
    pub endpoints: Vec<Endpoint>,
    /// Capability tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps: Option<Vec<String>>,
    /// Opaque free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Unknown fields, carried through re-encodes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Payload {
    pub fn new(ttl: u64, updated_at: u64, endpoints: Vec<Endpoint>) -> Self {
        Self {
            v: PAYLOAD_VERSION,
            ttl,
            updated_at,
            endpoints,
            caps: None,
            notes: None,
            extra: Map::new(),
        }
    }

    /// Structural invariants: `v >= 1`, non-empty endpoint list
    pub fn validate(&self) -> Result<()> {
        if self.v < 1 {
            return Err(Error::Argument(format!("unsupported payload version {}", self.v)));
        }
        if self.endpoints.is_empty() {
            return Err(Error::Argument("payload has no endpoints".into()));
        }
        Ok(())
    }

    /// End of the freshness window computed from the payload alone
    pub fn expires_at(&self) -> u64 {
        self.updated_at.saturating_add(self.ttl)
    }
}

/// Canonical UTF-8 JSON encoding of a payload
pub fn encode(payload: &Payload) -> Result<Vec<u8>> {
    payload.validate()?;
    serde_json::to_vec(payload).map_err(|e| Error::Internal(e.to_string()))
}

/// Strict parse of a payload
///
/// Rejects records where `endpoints` is missing or not an array, or
/// where `ttl`/`updated_at` are not non-negative integers. Unknown
/// fields are kept.
pub fn decode(bytes: &[u8]) -> Result<Payload> {
    let payload: Payload = serde_json::from_slice(bytes)
        .map_err(|e| Error::Argument(format!("invalid payload: {e}")))?;
    payload.validate()?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Payload {
        let mut p = Payload::new(
            600,
            1_766_726_400,
            vec![
                Endpoint::new("tcp", "[2001:db8:abcd:42::10]:9735")
                    .with_priority(5)
                    .with_family("ipv6"),
                Endpoint::new("tcp", "203.0.113.42:9735")
                    .with_priority(10)
                    .with_family("ipv4"),
            ],
        );
        p.caps = Some(vec!["nostr-connect".into()]);
        p
    }

    #[test]
    fn test_roundtrip() {
        let p = sample();
        let bytes = encode(&p).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_uri_alias_accepted() {
        let json = br#"{"v":1,"ttl":60,"updated_at":1000,
            "endpoints":[{"type":"tcp","uri":"10.0.0.1:80","family":"ipv4"}]}"#;
        let p = decode(json).unwrap();
        assert_eq!(p.endpoints[0].url, "10.0.0.1:80");

        // canonical emission uses `url`
        let reencoded = String::from_utf8(encode(&p).unwrap()).unwrap();
        assert!(reencoded.contains("\"url\""));
        assert!(!reencoded.contains("\"uri\""));
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let json = br#"{"v":1,"ttl":60,"updated_at":1000,"future_field":{"a":1},
            "endpoints":[{"type":"tcp","url":"10.0.0.1:80","hint":"x"}]}"#;
        let p = decode(json).unwrap();
        assert_eq!(p.extra["future_field"]["a"], 1);
        assert_eq!(p.endpoints[0].extra["hint"], "x");

        let decoded = decode(&encode(&p).unwrap()).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_strict_rejections() {
        // endpoints missing
        assert!(decode(br#"{"v":1,"ttl":60,"updated_at":1000}"#).is_err());
        // endpoints not an array
        assert!(decode(br#"{"v":1,"ttl":60,"updated_at":1000,"endpoints":{}}"#).is_err());
        // empty endpoint list
        assert!(decode(br#"{"v":1,"ttl":60,"updated_at":1000,"endpoints":[]}"#).is_err());
        // ttl not a number
        assert!(decode(
            br#"{"v":1,"ttl":"60","updated_at":1000,"endpoints":[{"type":"t","url":"u"}]}"#
        )
        .is_err());
        // updated_at not a number
        assert!(decode(
            br#"{"v":1,"ttl":60,"updated_at":null,"endpoints":[{"type":"t","url":"u"}]}"#
        )
        .is_err());
        // version zero
        assert!(decode(
            br#"{"v":0,"ttl":60,"updated_at":1000,"endpoints":[{"type":"t","url":"u"}]}"#
        )
        .is_err());
    }

    #[test]
    fn test_priority_default() {
        let e = Endpoint::new("tcp", "10.0.0.1:80");
        assert_eq!(e.priority_or_default(), DEFAULT_PRIORITY);
        assert_eq!(e.clone().with_priority(5).priority_or_default(), 5);
    }

    #[test]
    fn test_expires_at_saturates() {
        let p = Payload::new(u64::MAX, u64::MAX, vec![Endpoint::new("t", "u")]);
        assert_eq!(p.expires_at(), u64::MAX);
    }
}
