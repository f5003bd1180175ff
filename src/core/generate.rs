//! # Generate
//!
//! Generate random strings for receiver identifiers.

use base64ct::{Base64UrlUnpadded, Encoding};

const SAFE_CHARS: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789)(*&^%$#@!~";
const RECEIVER_LEN: usize = 16;

/// Generates a base64 encoded random string identifying a receiving context.
#[must_use]
pub fn receiver_id() -> String {
    let rnd = random_string(RECEIVER_LEN, SAFE_CHARS);
    Base64UrlUnpadded::encode_string(rnd.as_bytes())
}

// Generates a random string from a given set of characters. Uses fastrand so is
// not cryptographically secure.
fn random_string(len: usize, charset: &str) -> String {
    let chars: Vec<char> = charset.chars().collect();
    (0..len).map(|_| chars[fastrand::usize(..chars.len())]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_safe() {
        let id = receiver_id();
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(id, receiver_id());
    }
}
