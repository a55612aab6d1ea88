//! Change detection for polling clients. The fingerprint covers everything
//! a rendered session view can differ by between polls: the version and the
//! seat picture. Timestamps and labels stay out so identical state yields
//! an identical tag from any process.

use sha2::{Digest, Sha256};

use crate::seats::SeatAssignment;

/// Weak validator of the form `W/"v-<version>-<digest>"`. The digest is
/// the first eight hex characters of a SHA-256 over the seat identities
/// and observer count, so every server replica derives the same tag from
/// the same stored state.
pub fn fingerprint(version: u64, seats: &SeatAssignment) -> String {
    let first = seats.first.as_ref().map_or("", |h| h.identity.as_str());
    let second = seats.second.as_ref().map_or("", |h| h.identity.as_str());
    let material = format!(
        "first={first};second={second};obs={}",
        seats.observer_count()
    );
    let digest = Sha256::digest(material.as_bytes());
    let short: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("W/\"v-{version}-{short}\"")
}

/// Whether the client's `If-None-Match` value names the current tag.
/// Comparison is exact: no list parsing, no strong/weak coercion.
pub fn matches(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.map_or(false, |candidate| candidate == etag)
}
