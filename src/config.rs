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

//! Cryptographic configuration.
//!
//! The encryption key and the fingerprint pepper are process-wide
//! configuration, supplied once at startup and injected into the components
//! that need them. A missing or malformed key is a fatal startup condition,
//! never a per-request error.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;

/// Environment variable holding the base64-encoded 256-bit encryption key.
pub const KEY_ENV: &str = "ENCRYPT_SECRET";

/// Environment variable holding the fingerprint pepper.
pub const PEPPER_ENV: &str = "PAN_PEPPER";

/// Fatal configuration errors detected at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoConfigError {
    #[error("{KEY_ENV} is not set")]
    MissingKey,

    #[error("encryption key is not valid base64")]
    InvalidKeyEncoding,

    #[error("encryption key must be 32 bytes after base64 decoding, got {0}")]
    WrongKeyLength(usize),

    #[error("{PEPPER_ENV} is not set")]
    MissingPepper,
}

/// Key material for the PAN cipher and fingerprint hasher.
///
/// The AES key and the pepper are distinct secrets: the pepper only feeds the
/// lookup fingerprint and never decrypts anything.
pub struct CryptoConfig {
    key: Secret<Vec<u8>>,
    pepper: Secret<String>,
}

impl Clone for CryptoConfig {
    fn clone(&self) -> Self {
        Self {
            key: Secret::new(self.key.expose_secret().clone()),
            pepper: Secret::new(self.pepper.expose_secret().clone()),
        }
    }
}

impl CryptoConfig {
    /// Required decoded key length in bytes (AES-256).
    pub const KEY_LEN: usize = 32;

    /// Builds a config from a base64-encoded key and a pepper string.
    pub fn new(key_b64: &str, pepper: &str) -> Result<Self, CryptoConfigError> {
        if key_b64.trim().is_empty() {
            return Err(CryptoConfigError::MissingKey);
        }
        let key = BASE64
            .decode(key_b64.trim())
            .map_err(|_| CryptoConfigError::InvalidKeyEncoding)?;
        if key.len() != Self::KEY_LEN {
            return Err(CryptoConfigError::WrongKeyLength(key.len()));
        }
        if pepper.is_empty() {
            return Err(CryptoConfigError::MissingPepper);
        }
        Ok(Self {
            key: Secret::new(key),
            pepper: Secret::new(pepper.to_owned()),
        })
    }

    /// Reads [`KEY_ENV`] and [`PEPPER_ENV`] from the process environment.
    pub fn from_env() -> Result<Self, CryptoConfigError> {
        let key_b64 = std::env::var(KEY_ENV).map_err(|_| CryptoConfigError::MissingKey)?;
        let pepper = std::env::var(PEPPER_ENV).map_err(|_| CryptoConfigError::MissingPepper)?;
        Self::new(&key_b64, &pepper)
    }

    pub(crate) fn key_bytes(&self) -> &[u8] {
        self.key.expose_secret()
    }

    pub(crate) fn pepper_bytes(&self) -> &[u8] {
        self.pepper.expose_secret().as_bytes()
    }
}
