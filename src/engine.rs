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

//! Card funds-transfer engine.
//!
//! The [`CardEngine`] is the central component: it registers cards (sealing
//! the PAN and fingerprinting it for duplicate detection), moves funds
//! between two locked cards, and appends the immutable ledger entry for
//! every completed transfer.
//!
//! # Operations
//!
//! - **Card creation**: normalize, fingerprint, and encrypt the PAN; reject
//!   duplicates without decrypting anything already stored.
//! - **Transfers**: validate, lock both cards, enforce invariants, then
//!   debit, credit, and append the ledger entry as one atomic unit.
//! - **Top-ups**: credit a single `ACTIVE` card (no ledger entry).
//! - **Status changes**: owner block requests and administrative overrides.
//!
//! # Thread Safety
//!
//! Cards are locked in ascending [`CardId`] order regardless of transfer
//! direction, so two transfers crossing the same pair of cards contend on
//! the same first lock instead of deadlocking. All balance reads and writes
//! happen with both guards held.

use crate::base::{CardId, OwnerId, TransactionId};
use crate::card::{Card, CardStatus};
use crate::config::{CryptoConfig, CryptoConfigError};
use crate::error::{CardError, CardSide};
use crate::ledger::Ledger;
use crate::pan_cipher::PanCipher;
use crate::pan_hasher::{PanHasher, normalize};
use crate::store::{CardStore, OwnerDirectory};
use crate::transaction::Transaction;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

const PAN_LEN: usize = 16;

/// Transfer engine over a card store and an owner directory.
///
/// Key material is injected at construction; the engine never reads ambient
/// configuration while serving a request.
///
/// # Invariants
///
/// - A card balance never goes negative, under any interleaving.
/// - Encrypted PANs and fingerprints are each globally unique.
/// - Ledger entries are written exactly once per successful transfer and
///   never mutated.
pub struct CardEngine {
    store: Arc<dyn CardStore>,
    owners: Arc<dyn OwnerDirectory>,
    ledger: Ledger,
    cipher: PanCipher,
    hasher: PanHasher,
}

impl CardEngine {
    /// Builds an engine from validated crypto configuration and the two
    /// persistence collaborators.
    ///
    /// # Errors
    ///
    /// [`CryptoConfigError`] if the key material is unusable; this is fatal
    /// at startup, never a per-request condition.
    pub fn new(
        config: &CryptoConfig,
        store: Arc<dyn CardStore>,
        owners: Arc<dyn OwnerDirectory>,
    ) -> Result<Self, CryptoConfigError> {
        Ok(Self {
            store,
            owners,
            ledger: Ledger::new(),
            cipher: PanCipher::new(config)?,
            hasher: PanHasher::new(config),
        })
    }

    /// Registers a new card for `owner_id`.
    ///
    /// The raw PAN is normalized, fingerprinted, and sealed; only the
    /// ciphertext, the fingerprint, and the last four digits are persisted.
    ///
    /// # Errors
    ///
    /// - [`CardError::OwnerNotFound`] - owner is not in the directory.
    /// - [`CardError::InvalidPan`] - normalized PAN is not 16 digits.
    /// - [`CardError::CardExpired`] - expiry date not strictly in the future.
    /// - [`CardError::DuplicateFingerprint`] / [`CardError::DuplicatePan`] -
    ///   a card with this PAN already exists.
    pub fn create_card(
        &self,
        owner_id: OwnerId,
        raw_pan: &str,
        expiry_date: NaiveDate,
    ) -> Result<Arc<Card>, CardError> {
        if !self.owners.exists(owner_id) {
            return Err(CardError::OwnerNotFound(owner_id));
        }

        let pan = normalize(raw_pan);
        if pan.len() != PAN_LEN || !pan.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CardError::InvalidPan);
        }
        if expiry_date <= Utc::now().date_naive() {
            return Err(CardError::CardExpired);
        }

        let fingerprint = self.hasher.fingerprint(&pan);
        if self.store.fingerprint_exists(&fingerprint) {
            return Err(CardError::DuplicateFingerprint);
        }

        let encrypted_pan = self.cipher.encrypt(&pan)?;
        if self.store.encrypted_pan_exists(&encrypted_pan) {
            return Err(CardError::DuplicatePan);
        }

        let last4 = pan[PAN_LEN - 4..].to_owned();
        let card = self.store.insert(Card::new(
            owner_id,
            encrypted_pan,
            fingerprint,
            last4,
            expiry_date,
        ))?;

        info!(card = %card.id(), owner = %owner_id, "card created");
        Ok(card)
    }

    /// Moves `amount` from one of the owner's cards to another.
    ///
    /// Preconditions are checked in a fixed order, each with its own error
    /// kind:
    ///
    /// | # | Check | Error |
    /// |---|-------|-------|
    /// | 1 | amount positive, at most 2 decimal places | [`CardError::InvalidAmount`] / [`CardError::AmountPrecision`] |
    /// | 2 | owner exists | [`CardError::OwnerNotFound`] |
    /// | 3 | both cards exist | [`CardError::CardNotFound`] |
    /// | 4 | both cards belong to the owner | [`CardError::NotCardOwner`] |
    /// | 5 | source differs from destination | [`CardError::SameCard`] |
    /// | 6 | source balance covers the amount | [`CardError::InsufficientFunds`] |
    /// | 7 | both cards `ACTIVE` | [`CardError::InactiveCard`] |
    ///
    /// Checks 6-7, the debit, the credit, and the ledger append all happen
    /// with both row locks held: either all three effects become visible or
    /// none do.
    pub fn transfer(
        &self,
        owner_id: OwnerId,
        from_id: CardId,
        to_id: CardId,
        amount: Decimal,
    ) -> Result<Arc<Transaction>, CardError> {
        validate_amount(amount)?;

        if !self.owners.exists(owner_id) {
            return Err(CardError::OwnerNotFound(owner_id));
        }

        let from = self
            .store
            .find_for_update(from_id)
            .ok_or(CardError::CardNotFound(from_id))?;
        let to = self
            .store
            .find_for_update(to_id)
            .ok_or(CardError::CardNotFound(to_id))?;

        if from.owner_id() != owner_id {
            return Err(CardError::NotCardOwner(from_id));
        }
        if to.owner_id() != owner_id {
            return Err(CardError::NotCardOwner(to_id));
        }
        if from_id == to_id {
            return Err(CardError::SameCard);
        }

        let (mut from_state, mut to_state) = Card::lock_pair(&from, &to);

        if from_state.balance() < amount {
            return Err(CardError::InsufficientFunds);
        }
        if from_state.status() != CardStatus::Active {
            return Err(CardError::InactiveCard {
                side: CardSide::Source,
                status: from_state.status(),
            });
        }
        if to_state.status() != CardStatus::Active {
            return Err(CardError::InactiveCard {
                side: CardSide::Target,
                status: to_state.status(),
            });
        }

        from_state.debit(amount)?;
        to_state.credit(amount)?;
        let entry = self
            .ledger
            .append(owner_id, from_id, to_id, amount, "OK".to_owned());

        info!(
            transaction = %entry.id(),
            owner = %owner_id,
            from = %from_id,
            to = %to_id,
            amount = %amount,
            "transfer completed"
        );
        Ok(entry)
    }

    /// Credits a single `ACTIVE` card.
    ///
    /// Top-ups produce no ledger entry; auditing them is left to the
    /// surrounding system.
    pub fn top_up(&self, card_id: CardId, amount: Decimal) -> Result<(), CardError> {
        validate_amount(amount)?;

        let card = self
            .store
            .find_for_update(card_id)
            .ok_or(CardError::CardNotFound(card_id))?;

        let mut state = card.lock();
        state.credit(amount)?;

        debug!(card = %card_id, amount = %amount, "top-up applied");
        Ok(())
    }

    /// Owner-triggered block request.
    ///
    /// # Errors
    ///
    /// - [`CardError::CardNotFound`] - no such card.
    /// - [`CardError::NotCardOwner`] - requester does not own the card.
    /// - [`CardError::AlreadyBlocked`] - card is already `BLOCKED`.
    pub fn request_block(&self, card_id: CardId, owner_id: OwnerId) -> Result<(), CardError> {
        let card = self
            .store
            .find_for_update(card_id)
            .ok_or(CardError::CardNotFound(card_id))?;

        if card.owner_id() != owner_id {
            return Err(CardError::NotCardOwner(card_id));
        }

        card.lock().request_block(card_id)?;
        debug!(card = %card_id, owner = %owner_id, "block requested");
        Ok(())
    }

    /// Administrative status override, any state to any state.
    pub fn admin_set_status(&self, card_id: CardId, status: CardStatus) -> Result<(), CardError> {
        let card = self
            .store
            .find_for_update(card_id)
            .ok_or(CardError::CardNotFound(card_id))?;

        card.lock().set_status(status);
        debug!(card = %card_id, %status, "status set");
        Ok(())
    }

    /// Fetches a card handle without locking it.
    pub fn card(&self, card_id: CardId) -> Option<Arc<Card>> {
        self.store.find_for_update(card_id)
    }

    /// Ledger entries touching the card, newest first.
    pub fn transactions_by_card(&self, card_id: CardId) -> Vec<Arc<Transaction>> {
        self.ledger.by_card(card_id)
    }

    /// Ledger entries recorded for the owner, newest first.
    pub fn transactions_by_owner(&self, owner_id: OwnerId) -> Vec<Arc<Transaction>> {
        self.ledger.by_owner(owner_id)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.ledger.get(id)
    }

    /// Absence check consumed by the surrounding system's deletion guard.
    pub fn card_has_transactions(&self, card_id: CardId) -> bool {
        self.ledger.has_entries_for(card_id)
    }
}

/// Amounts must be strictly positive and carry at most two fractional
/// digits; balances use exact decimal arithmetic throughout.
fn validate_amount(amount: Decimal) -> Result<(), CardError> {
    if amount <= Decimal::ZERO {
        return Err(CardError::InvalidAmount);
    }
    if amount.normalize().scale() > Card::DECIMAL_PRECISION {
        return Err(CardError::AmountPrecision);
    }
    Ok(())
}
