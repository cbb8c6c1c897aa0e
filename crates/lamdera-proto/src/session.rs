//! Session identifiers and the `sid` cookie the host uses to route traffic
//! to a persistent per-session actor.

#![allow(clippy::expect_used, reason = "static regex pattern is known-valid at compile time")]

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

/// Fixed 40-character seed appended to the random decimal prefix. This is
/// part of the wire contract with the host and must match byte-for-byte.
pub const SESSION_ID_SEED: &str = "c04b8f7b594cdeedebc2a8029b82943b0a620815";

/// Required length of a [`generate_session_id`] output.
pub const SESSION_ID_LEN: usize = 40;

static COOKIE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sid=([^;]+)").expect("static pattern is valid"));

/// Generates a fresh session id: a random integer in `[10000, 1_000_000)`
/// rendered in base 10, right-padded with [`SESSION_ID_SEED`] to exactly
/// [`SESSION_ID_LEN`] characters.
///
/// The randomness here is a routing hint, not a secret, so a
/// non-cryptographic generator is adequate and matches the host's own
/// contract.
pub fn generate_session_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let prefix = rng.gen_range(10_000..1_000_000).to_string();
    let pad_len = SESSION_ID_LEN - prefix.len();
    let mut id = prefix;
    id.push_str(&SESSION_ID_SEED[..pad_len]);
    debug_assert_eq!(id.len(), SESSION_ID_LEN);
    id
}

/// Formats the `Cookie` header value / document-cookie entry for `session_id`.
#[must_use]
pub fn session_cookie(session_id: &str) -> String {
    format!("sid={session_id}")
}

/// Extracts the first `sid=...` value from a cookie string, or
/// `"not present"` if none is found.
#[must_use]
pub fn extract_from_cookie(cookie: &str) -> String {
    COOKIE_PATTERN
        .captures(cookie)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| "not present".to_string(), |m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn session_id_has_expected_layout() {
        let mut rng = StdRng::seed_from_u64(42);
        let id = generate_session_id(&mut rng);
        assert_eq!(id.len(), SESSION_ID_LEN);
        let digit_count = id.chars().take_while(char::is_ascii_digit).count();
        assert!((5..=6).contains(&digit_count));
        assert!(id[digit_count..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn successive_generations_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            seen.insert(generate_session_id(&mut rng));
        }
        assert!(seen.len() > 9_900, "expected near-total distinctness, got {}", seen.len());
    }

    #[test]
    fn cookie_round_trip() {
        let id = "a".repeat(SESSION_ID_LEN);
        let cookie = session_cookie(&id);
        assert_eq!(cookie, format!("sid={id}"));
        assert_eq!(extract_from_cookie(&cookie), id);
    }

    #[test]
    fn cookie_extraction_among_other_entries() {
        assert_eq!(extract_from_cookie("foo=bar; sid=abc123; baz=qux"), "abc123");
        assert_eq!(extract_from_cookie("foo=bar; baz=qux"), "not present");
    }
}
