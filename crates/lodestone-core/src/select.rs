//! Deterministic ordering of resolved endpoints
//!
//! Priority is the publisher's stated intent; the family rank only
//! disambiguates equal priorities in favour of the privacy-preferring
//! transport. The sort is stable: ties on both keys keep the original
//! order.

use crate::payload::Endpoint;

const FAMILY_ONION: &str = "onion";
const FAMILY_IPV6: &str = "ipv6";
const FAMILY_IPV4: &str = "ipv4";

/// Rank for the address-family tie-break; lower is preferred
pub fn family_rank(family: Option<&str>) -> u8 {
    match family {
        Some(FAMILY_ONION) => 1,
        Some(FAMILY_IPV6) => 2,
        Some(FAMILY_IPV4) => 3,
        None => 4,
        Some(_) => 5,
    }
}

/// Return a copy of `endpoints` in connection order: ascending
/// priority (absent = 1000), then family rank, then original index.
pub fn select_endpoints(endpoints: &[Endpoint]) -> Vec<Endpoint> {
    let mut indexed: Vec<(usize, &Endpoint)> = endpoints.iter().enumerate().collect();
    indexed.sort_by_key(|(index, endpoint)| {
        (
            endpoint.priority_or_default(),
            family_rank(endpoint.family.as_deref()),
            *index,
        )
    });
    indexed.into_iter().map(|(_, e)| e.clone()).collect()
}
