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

//! Card records and the status state machine.
//!
//! Status transitions:
//!
//! ```text
//! Active ──owner request──► BlockRequested ──admin──► Blocked
//!   ▲                                                    │
//!   └───────────────────── admin ◄──────────────────────┘
//! ```
//!
//! An administrator may set any status directly; the owner can only request
//! a block, and only while the card is not already `Blocked`. There is no
//! terminal state.
//!
//! Identity and crypto fields are immutable after construction and live
//! outside the state mutex; only `status` and `balance` are mutable, and
//! only through the operations here, called under the row lock.

use crate::base::{CardId, OwnerId};
use crate::error::CardError;
use chrono::NaiveDate;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Active,
    BlockRequested,
    Blocked,
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardStatus::Active => write!(f, "ACTIVE"),
            CardStatus::BlockRequested => write!(f, "BLOCK_REQUESTED"),
            CardStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// The mutable portion of a card, guarded by the row lock.
#[derive(Debug)]
pub struct CardState {
    status: CardStatus,
    balance: Decimal,
}

impl CardState {
    fn new() -> Self {
        Self {
            status: CardStatus::Active,
            balance: Decimal::ZERO,
        }
    }

    pub fn status(&self) -> CardStatus {
        self.status
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: card balance went negative: {}",
            self.balance
        );
    }

    /// Increases the balance. Only `Active` cards may receive funds.
    pub(crate) fn credit(&mut self, amount: Decimal) -> Result<(), CardError> {
        if amount <= Decimal::ZERO {
            return Err(CardError::InvalidAmount);
        }
        if self.status != CardStatus::Active {
            return Err(CardError::NotActive { status: self.status });
        }
        self.balance += amount;
        self.assert_invariants();
        Ok(())
    }

    /// Decreases the balance. Only `Active` cards with sufficient funds.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<(), CardError> {
        if amount <= Decimal::ZERO {
            return Err(CardError::InvalidAmount);
        }
        if self.status != CardStatus::Active {
            return Err(CardError::NotActive { status: self.status });
        }
        if self.balance < amount {
            return Err(CardError::InsufficientFunds);
        }
        self.balance -= amount;
        self.assert_invariants();
        Ok(())
    }

    /// Owner-triggered block request.
    ///
    /// Re-requesting while already `BlockRequested` is tolerated; only a
    /// card that is already `Blocked` rejects the request.
    pub(crate) fn request_block(&mut self, card_id: CardId) -> Result<(), CardError> {
        if self.status == CardStatus::Blocked {
            return Err(CardError::AlreadyBlocked(card_id));
        }
        self.status = CardStatus::BlockRequested;
        Ok(())
    }

    /// Administrative status override: any state to any state.
    pub(crate) fn set_status(&mut self, status: CardStatus) {
        self.status = status;
    }
}

/// A persisted card record.
///
/// The state mutex doubles as the exclusive row lock: every balance or
/// status mutation happens under it, and the transfer engine holds both
/// cards' guards for the whole move.
#[derive(Debug)]
pub struct Card {
    id: CardId,
    owner_id: OwnerId,
    encrypted_pan: String,
    pan_hash: String,
    last4: String,
    expiry_date: NaiveDate,
    state: Mutex<CardState>,
}

impl Card {
    /// Balances carry exactly two fractional digits.
    pub const DECIMAL_PRECISION: u32 = 2;

    pub(crate) fn new(
        owner_id: OwnerId,
        encrypted_pan: String,
        pan_hash: String,
        last4: String,
        expiry_date: NaiveDate,
    ) -> Self {
        Self {
            id: CardId::random(),
            owner_id,
            encrypted_pan,
            pan_hash,
            last4,
            expiry_date,
            state: Mutex::new(CardState::new()),
        }
    }

    pub fn id(&self) -> CardId {
        self.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn encrypted_pan(&self) -> &str {
        &self.encrypted_pan
    }

    pub fn pan_hash(&self) -> &str {
        &self.pan_hash
    }

    pub fn last4(&self) -> &str {
        &self.last4
    }

    pub fn expiry_date(&self) -> NaiveDate {
        self.expiry_date
    }

    pub fn status(&self) -> CardStatus {
        self.state.lock().status
    }

    pub fn balance(&self) -> Decimal {
        self.state.lock().balance
    }

    /// Display form of the card number.
    ///
    /// Falls back to a fixed placeholder when fewer than four identifying
    /// characters are available.
    pub fn masked_number(&self) -> String {
        if self.last4.len() < 4 {
            return "****".to_owned();
        }
        format!("**** **** **** {}", self.last4)
    }

    /// Point-in-time copy of the card for display or export.
    pub fn snapshot(&self) -> CardSnapshot {
        let state = self.state.lock();
        CardSnapshot {
            id: self.id,
            owner_id: self.owner_id,
            masked_number: self.masked_number(),
            expiry_date: self.expiry_date,
            status: state.status,
            balance: state.balance,
        }
    }

    /// Acquires this card's row lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, CardState> {
        self.state.lock()
    }

    /// Acquires both row locks in ascending `CardId` order, whatever order
    /// the caller passed them in, and returns the guards in caller order.
    ///
    /// Two transfers crossing the same pair of cards in opposite directions
    /// therefore contend on the same first lock instead of deadlocking.
    /// Callers must pass two distinct cards.
    pub(crate) fn lock_pair<'a>(
        from: &'a Card,
        to: &'a Card,
    ) -> (MutexGuard<'a, CardState>, MutexGuard<'a, CardState>) {
        debug_assert!(from.id != to.id, "lock_pair requires distinct cards");
        if from.id <= to.id {
            let from_guard = from.state.lock();
            let to_guard = to.state.lock();
            (from_guard, to_guard)
        } else {
            let to_guard = to.state.lock();
            let from_guard = from.state.lock();
            (from_guard, to_guard)
        }
    }
}

impl Serialize for Card {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let state = self.state.lock();
        let mut out = serializer.serialize_struct("Card", 6)?;
        out.serialize_field("id", &self.id)?;
        out.serialize_field("owner_id", &self.owner_id)?;
        out.serialize_field("masked_number", &self.masked_number())?;
        out.serialize_field("expiry_date", &self.expiry_date)?;
        out.serialize_field("status", &state.status)?;
        out.serialize_field(
            "balance",
            &state.balance.round_dp(Card::DECIMAL_PRECISION),
        )?;
        out.end()
    }
}

/// Serializable point-in-time view of a card.
///
/// Carries the masked display form, never the PAN or its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CardSnapshot {
    pub id: CardId,
    pub owner_id: OwnerId,
    pub masked_number: String,
    pub expiry_date: NaiveDate,
    pub status: CardStatus,
    pub balance: Decimal,
}
