// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Deterministic lookup fingerprints for card numbers.
//!
//! Duplicate-card detection must never decrypt stored values, so each card
//! also persists a peppered HMAC-SHA256 of its normalized PAN. The same
//! normalized input under the same pepper always yields the same
//! fingerprint, which makes the column index-friendly.

use crate::config::CryptoConfig;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::hmac;

/// Strips all whitespace from a raw PAN. Digit order and length are
/// preserved; nothing else is altered.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Keyed fingerprint hasher over normalized card numbers.
///
/// The pepper is a secret distinct from the encryption key and is injected
/// once at construction.
pub struct PanHasher {
    key: hmac::Key,
}

impl PanHasher {
    pub fn new(config: &CryptoConfig) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, config.pepper_bytes()),
        }
    }

    /// Computes `base64(HMAC-SHA256(pepper, normalized))`.
    pub fn fingerprint(&self, normalized: &str) -> String {
        let tag = hmac::sign(&self.key, normalized.as_bytes());
        BASE64.encode(tag.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::{PanHasher, normalize};
    use crate::config::CryptoConfig;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn hasher(pepper: &str) -> PanHasher {
        let config = CryptoConfig::new(&BASE64.encode([9u8; 32]), pepper).unwrap();
        PanHasher::new(&config)
    }

    #[test]
    fn normalize_strips_whitespace_only() {
        assert_eq!(normalize("4111 1111 1111 1111"), "4111111111111111");
        assert_eq!(normalize(" 4111\t1111\n11111111 "), "4111111111111111");
        assert_eq!(normalize("4111111111111111"), "4111111111111111");
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let hasher = hasher("pepper");
        let a = hasher.fingerprint("4111111111111111");
        let b = hasher.fingerprint("4111111111111111");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_pans() {
        let hasher = hasher("pepper");
        assert_ne!(
            hasher.fingerprint("4111111111111111"),
            hasher.fingerprint("4111111111111112")
        );
    }

    #[test]
    fn fingerprint_depends_on_pepper() {
        assert_ne!(
            hasher("pepper-one").fingerprint("4111111111111111"),
            hasher("pepper-two").fingerprint("4111111111111111")
        );
    }

    #[test]
    fn fingerprint_has_fixed_length() {
        let hasher = hasher("pepper");
        // 32-byte MAC -> 44 base64 characters, regardless of input.
        assert_eq!(hasher.fingerprint("4111111111111111").len(), 44);
        assert_eq!(hasher.fingerprint("").len(), 44);
    }
}
