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

//! Append-only transaction ledger.
//!
//! Entries are written once, never mutated, and retrieved in descending
//! creation-time order. A journal vector preserves append order while a
//! [`DashMap`] index serves point lookups; `created_at` is assigned under
//! the append lock and clamped to be monotonically non-decreasing per
//! ledger instance, so append order and timestamp order never diverge.

use crate::base::{CardId, OwnerId, TransactionId};
use crate::transaction::{Transaction, TransactionStatus};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Ledger {
    /// Entries in append (== creation-time) order.
    journal: RwLock<Vec<Arc<Transaction>>>,

    /// Point-lookup index by transaction ID.
    by_id: DashMap<TransactionId, Arc<Transaction>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one successful-transfer entry and returns it.
    ///
    /// Called with both card row locks held, which makes the debit, the
    /// credit, and this append one atomic unit relative to every other
    /// engine operation.
    pub(crate) fn append(
        &self,
        owner_id: OwnerId,
        from_card: CardId,
        to_card: CardId,
        amount: Decimal,
        message: String,
    ) -> Arc<Transaction> {
        let mut journal = self.journal.write();

        // Clamp against the previous entry so created_at never goes
        // backwards even if the wall clock does.
        let mut created_at = Utc::now();
        if let Some(last) = journal.last() {
            created_at = created_at.max(last.created_at());
        }

        let entry = Arc::new(Transaction::new(
            owner_id,
            from_card,
            to_card,
            amount,
            TransactionStatus::Success,
            created_at,
            message,
        ));
        journal.push(Arc::clone(&entry));
        self.by_id.insert(entry.id(), Arc::clone(&entry));
        entry
    }

    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.by_id.get(&id).map(|entry| Arc::clone(&entry))
    }

    /// Entries debiting or crediting the card, newest first.
    pub fn by_card(&self, card_id: CardId) -> Vec<Arc<Transaction>> {
        self.journal
            .read()
            .iter()
            .rev()
            .filter(|entry| entry.touches(card_id))
            .cloned()
            .collect()
    }

    /// Entries recorded for the owner, newest first.
    pub fn by_owner(&self, owner_id: OwnerId) -> Vec<Arc<Transaction>> {
        self.journal
            .read()
            .iter()
            .rev()
            .filter(|entry| entry.owner_id() == owner_id)
            .cloned()
            .collect()
    }

    /// Absence check used by the surrounding system's card-deletion guard.
    pub fn has_entries_for(&self, card_id: CardId) -> bool {
        self.journal
            .read()
            .iter()
            .any(|entry| entry.touches(card_id))
    }

    pub fn len(&self) -> usize {
        self.journal.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.read().is_empty()
    }
}
