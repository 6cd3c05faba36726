//! Identity key derivation.
//!
//! Rate limit keys come from an authenticated user id when one is known.
//! Anonymous callers are keyed by whatever coarse identity signal the host
//! can offer: a client fingerprint, a peer address, or a session token. The
//! anonymous keys are heuristic; distinct callers may collide and a caller
//! can change its key by changing the signal.

use std::net::IpAddr;

/// A source of identity for callers without a user id.
pub trait IdentitySource {
    /// The raw identity signal, or `None` when nothing is available.
    fn identity(&self) -> Option<String>;
}

/// Browser-style fingerprint built from the user agent and screen size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientFingerprint {
    /// Raw `User-Agent` string
    pub user_agent: String,
    /// Screen resolution as `WIDTHxHEIGHT`
    pub screen_resolution: String,
}

impl ClientFingerprint {
    /// Create a fingerprint from a user agent and a `WIDTHxHEIGHT` resolution.
    pub fn new(user_agent: impl Into<String>, screen_resolution: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            screen_resolution: screen_resolution.into(),
        }
    }
}

impl IdentitySource for ClientFingerprint {
    fn identity(&self) -> Option<String> {
        if self.user_agent.is_empty() && self.screen_resolution.is_empty() {
            return None;
        }
        Some(format!("{}|{}", self.user_agent, self.screen_resolution))
    }
}

/// The remote address of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress(pub IpAddr);

impl IdentitySource for PeerAddress {
    fn identity(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

/// An opaque session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(pub String);

impl IdentitySource for SessionToken {
    fn identity(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.clone())
    }
}

/// No identity signal at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unidentified;

impl IdentitySource for Unidentified {
    fn identity(&self) -> Option<String> {
        None
    }
}

/// Build the rate limit key for a caller.
///
/// A non-empty `user_id` gives `user:<id>`. Otherwise the key is
/// `anon:<hash>` over the source's identity signal.
pub fn user_key(user_id: Option<&str>, source: &dyn IdentitySource) -> String {
    match user_id.filter(|id| !id.is_empty()) {
        Some(id) => format!("user:{id}"),
        None => {
            let signal = source.identity().unwrap_or_default();
            format!("anon:{}", fingerprint_hash(&signal))
        }
    }
}

/// Hash a string to a short base-36 token.
///
/// 32-bit `h * 31 + c` over the UTF-16 code units, rendered as the base-36
/// magnitude. Short and stable, not collision resistant.
pub fn fingerprint_hash(input: &str) -> String {
    let hash = input
        .encode_utf16()
        .fold(0i32, |h, unit| (h << 5).wrapping_sub(h).wrapping_add(i32::from(unit)));

    to_base36(hash.unsigned_abs())
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
