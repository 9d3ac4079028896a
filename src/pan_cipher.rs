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

//! Authenticated encryption for stored card numbers.
//!
//! A plaintext PAN is sealed with AES-256-GCM under a fresh random 96-bit
//! nonce and persisted as `base64(nonce || ciphertext+tag)`. Decryption is
//! tolerant: values that do not look like ciphertext, or that fail to open,
//! are handed back unchanged as [`DecodedPan::PassedThrough`]. Rows written
//! before encryption was introduced keep working without a data migration,
//! while every new write is protected.

use crate::config::{CryptoConfig, CryptoConfigError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::aead::{Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM};
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use tracing::warn;

const NONCE_LEN: usize = 12;

/// Shortest value worth probing as ciphertext. Anything shorter decodes to
/// at most the nonce and cannot carry a tag.
const MIN_CANDIDATE_LEN: usize = 16;

/// Runtime cryptographic failures.
///
/// Key-material problems are caught at construction as
/// [`CryptoConfigError`]; this only covers the seal path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("PAN encryption failed")]
    SealFailed,
}

/// Outcome of decoding a stored card-number value.
///
/// The passthrough path is a designed legacy-compatibility behavior, not a
/// swallowed error, so callers can observe which path was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPan {
    /// The value was authenticated ciphertext; this is the plaintext PAN.
    Decrypted(String),
    /// The value was not decryptable and is returned unchanged.
    PassedThrough(String),
}

impl DecodedPan {
    pub fn as_str(&self) -> &str {
        match self {
            DecodedPan::Decrypted(s) | DecodedPan::PassedThrough(s) => s,
        }
    }

    pub fn into_inner(self) -> String {
        match self {
            DecodedPan::Decrypted(s) | DecodedPan::PassedThrough(s) => s,
        }
    }

    pub fn was_decrypted(&self) -> bool {
        matches!(self, DecodedPan::Decrypted(_))
    }
}

/// One-shot nonce sequence: each sealing/opening key is used exactly once.
struct SingleNonce {
    nonce: [u8; NONCE_LEN],
}

impl SingleNonce {
    fn new(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, Unspecified> {
        Nonce::try_assume_unique_for_key(&self.nonce)
    }
}

/// AES-256-GCM codec for card numbers.
///
/// Holds the symmetric key injected at construction; nothing here reads
/// ambient configuration.
pub struct PanCipher {
    key: [u8; CryptoConfig::KEY_LEN],
    rng: SystemRandom,
}

impl PanCipher {
    pub fn new(config: &CryptoConfig) -> Result<Self, CryptoConfigError> {
        let key: [u8; CryptoConfig::KEY_LEN] = config
            .key_bytes()
            .try_into()
            .map_err(|_| CryptoConfigError::WrongKeyLength(config.key_bytes().len()))?;
        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Seals a plaintext PAN into `base64(nonce || ciphertext+tag)`.
    ///
    /// Every call draws a fresh random nonce, so two encryptions of the same
    /// PAN never produce the same blob. Blank input has nothing to protect
    /// and passes through unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.trim().is_empty() {
            return Ok(plaintext.to_owned());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::SealFailed)?;

        let unbound_key =
            UnboundKey::new(&AES_256_GCM, &self.key).map_err(|_| CryptoError::SealFailed)?;
        let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut in_out = plaintext.as_bytes().to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::SealFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);
        Ok(BASE64.encode(blob))
    }

    /// Opens a stored value.
    ///
    /// Values that fail the structural gate, decode to no more than a nonce,
    /// or fail authenticated decryption are returned unchanged: they are
    /// assumed to be legacy rows in an earlier, unencrypted format.
    pub fn decrypt(&self, stored: &str) -> DecodedPan {
        if stored.trim().is_empty() || !is_ciphertext_candidate(stored) {
            return DecodedPan::PassedThrough(stored.to_owned());
        }

        let Ok(blob) = BASE64.decode(stored) else {
            return DecodedPan::PassedThrough(stored.to_owned());
        };
        if blob.len() <= NONCE_LEN {
            return DecodedPan::PassedThrough(stored.to_owned());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&blob[..NONCE_LEN]);

        let Ok(unbound_key) = UnboundKey::new(&AES_256_GCM, &self.key) else {
            return DecodedPan::PassedThrough(stored.to_owned());
        };
        let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut in_out = blob[NONCE_LEN..].to_vec();
        match opening_key.open_in_place(Aad::empty(), &mut in_out) {
            Ok(plaintext) => match String::from_utf8(plaintext.to_vec()) {
                Ok(pan) => DecodedPan::Decrypted(pan),
                Err(_) => DecodedPan::PassedThrough(stored.to_owned()),
            },
            Err(_) => {
                warn!(len = stored.len(), "undecryptable candidate value passed through");
                DecodedPan::PassedThrough(stored.to_owned())
            }
        }
    }
}

/// Structural gate: is the value even plausibly our base64 blob layout?
fn is_ciphertext_candidate(value: &str) -> bool {
    if value.len() < MIN_CANDIDATE_LEN || value.len() % 4 != 0 {
        return false;
    }
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
}

#[cfg(test)]
mod tests {
    use super::{DecodedPan, PanCipher, is_ciphertext_candidate};
    use crate::config::CryptoConfig;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn cipher_with_key(byte: u8) -> PanCipher {
        let config = CryptoConfig::new(&BASE64.encode([byte; 32]), "pepper").unwrap();
        PanCipher::new(&config).unwrap()
    }

    #[test]
    fn roundtrip_recovers_pan() {
        let cipher = cipher_with_key(1);
        let pan = "4111111111111111";

        let blob = cipher.encrypt(pan).unwrap();
        assert_ne!(blob, pan);
        assert_eq!(cipher.decrypt(&blob), DecodedPan::Decrypted(pan.to_owned()));
    }

    #[test]
    fn encryption_is_non_deterministic() {
        let cipher = cipher_with_key(1);
        let pan = "4111111111111111";

        let blob1 = cipher.encrypt(pan).unwrap();
        let blob2 = cipher.encrypt(pan).unwrap();
        assert_ne!(blob1, blob2);

        assert_eq!(cipher.decrypt(&blob1).into_inner(), pan);
        assert_eq!(cipher.decrypt(&blob2).into_inner(), pan);
    }

    #[test]
    fn wrong_key_passes_original_through() {
        let blob = cipher_with_key(1).encrypt("4111111111111111").unwrap();

        let other = cipher_with_key(2);
        assert_eq!(other.decrypt(&blob), DecodedPan::PassedThrough(blob.clone()));
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        let cipher = cipher_with_key(1);

        // A bare 16-digit PAN decodes to exactly 12 bytes of base64 and is
        // treated as a legacy row, never as ciphertext.
        let legacy = "4111111111111111";
        assert_eq!(
            cipher.decrypt(legacy),
            DecodedPan::PassedThrough(legacy.to_owned())
        );

        let spaced = "4111 1111 1111 1111";
        assert_eq!(
            cipher.decrypt(spaced),
            DecodedPan::PassedThrough(spaced.to_owned())
        );
    }

    #[test]
    fn blank_input_passes_through_both_directions() {
        let cipher = cipher_with_key(1);
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt(""), DecodedPan::PassedThrough(String::new()));
    }

    #[test]
    fn tampered_blob_passes_original_through() {
        let cipher = cipher_with_key(1);
        let blob = cipher.encrypt("4111111111111111").unwrap();

        let mut bytes = BASE64.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);

        assert_eq!(
            cipher.decrypt(&tampered),
            DecodedPan::PassedThrough(tampered.clone())
        );
    }

    #[test]
    fn candidate_gate_rejects_foreign_shapes() {
        assert!(!is_ciphertext_candidate("short"));
        assert!(!is_ciphertext_candidate("has spaces in it and padding"));
        assert!(!is_ciphertext_candidate("length-not-a-multiple-of-four!"));
        assert!(!is_ciphertext_candidate("dashes-are-not-in-the-alphabet!!"));
        assert!(is_ciphertext_candidate("AAAABBBBCCCCDDDD"));
    }

    #[test]
    fn decrypted_outcome_is_observable() {
        let cipher = cipher_with_key(1);
        let blob = cipher.encrypt("4111111111111111").unwrap();

        assert!(cipher.decrypt(&blob).was_decrypted());
        assert!(!cipher.decrypt("4111111111111111").was_decrypted());
    }
}
