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

//! Error types for card and transfer operations.

use crate::base::{CardId, OwnerId};
use crate::card::CardStatus;
use crate::pan_cipher::CryptoError;
use std::fmt;
use thiserror::Error;

/// Which card of a transfer an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSide {
    Source,
    Target,
}

impl fmt::Display for CardSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardSide::Source => write!(f, "from"),
            CardSide::Target => write!(f, "to"),
        }
    }
}

/// Coarse classification of a [`CardError`].
///
/// Collaborators (e.g. an HTTP layer) map each kind to a transport-level
/// response without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// A referenced card or owner does not exist.
    NotFound,
    /// The requester does not own the resource.
    Permission,
    /// State already held by another record or operation.
    Conflict,
    /// Source balance below the requested amount.
    InsufficientFunds,
    /// A card involved in the operation is not `ACTIVE`.
    InactiveCard,
    /// Unexpected failure inside the engine itself.
    Internal,
}

/// Card and transfer operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    /// Amount is zero or negative
    #[error("amount must be positive")]
    InvalidAmount,

    /// Amount carries more than two fractional digits
    #[error("amount precision exceeds 2 decimal places")]
    AmountPrecision,

    /// Normalized PAN is not exactly 16 digits
    #[error("invalid card number (normalized PAN must be 16 digits)")]
    InvalidPan,

    /// Expiry date is not strictly in the future
    #[error("card expiry date must be in the future")]
    CardExpired,

    /// Transfer source and destination are the same card
    #[error("from and to cards must be different")]
    SameCard,

    /// Referenced owner does not exist
    #[error("owner not found: {0}")]
    OwnerNotFound(OwnerId),

    /// Referenced card does not exist
    #[error("card not found: {0}")]
    CardNotFound(CardId),

    /// Card belongs to a different owner than the requesting one
    #[error("card {0} does not belong to the requesting owner")]
    NotCardOwner(CardId),

    /// A card with the same PAN fingerprint already exists
    #[error("a card with this PAN fingerprint already exists")]
    DuplicateFingerprint,

    /// A card with the same encrypted PAN already exists
    #[error("a card with this encrypted PAN already exists")]
    DuplicatePan,

    /// Block requested for a card that is already blocked
    #[error("card {0} is already blocked")]
    AlreadyBlocked(CardId),

    /// Source balance below the requested amount
    #[error("insufficient funds on the source card")]
    InsufficientFunds,

    /// A transfer-side card is not `ACTIVE`
    #[error("{side} card is not ACTIVE: {status}")]
    InactiveCard { side: CardSide, status: CardStatus },

    /// A single-card operation hit a card that is not `ACTIVE`
    #[error("card is not ACTIVE: {status}")]
    NotActive { status: CardStatus },

    /// Cryptographic operation failed at runtime
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl CardError {
    /// Classifies this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CardError::InvalidAmount
            | CardError::AmountPrecision
            | CardError::InvalidPan
            | CardError::CardExpired
            | CardError::SameCard => ErrorKind::Validation,
            CardError::OwnerNotFound(_) | CardError::CardNotFound(_) => ErrorKind::NotFound,
            CardError::NotCardOwner(_) => ErrorKind::Permission,
            CardError::DuplicateFingerprint
            | CardError::DuplicatePan
            | CardError::AlreadyBlocked(_) => ErrorKind::Conflict,
            CardError::InsufficientFunds => ErrorKind::InsufficientFunds,
            CardError::InactiveCard { .. } | CardError::NotActive { .. } => ErrorKind::InactiveCard,
            CardError::Crypto(_) => ErrorKind::Internal,
        }
    }
}
