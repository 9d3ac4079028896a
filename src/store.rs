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

//! Record-store and owner-directory contracts.
//!
//! The engine consumes these seams instead of owning persistence. A store
//! hands out shared [`Card`] handles; the handle's state mutex is the
//! exclusive row lock, so mutations made under it are immediately visible
//! through the same handle, the in-memory analogue of `SELECT ... FOR
//! UPDATE` followed by an in-transaction save.

use crate::base::{CardId, OwnerId};
use crate::card::Card;
use crate::error::CardError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Card persistence contract.
pub trait CardStore: Send + Sync {
    /// Fetches the card's handle; locking its state is the caller's
    /// `FOR UPDATE`.
    fn find_for_update(&self, id: CardId) -> Option<Arc<Card>>;

    /// Persists a new card, enforcing global uniqueness of both the
    /// encrypted PAN and its fingerprint.
    fn insert(&self, card: Card) -> Result<Arc<Card>, CardError>;

    fn encrypted_pan_exists(&self, encrypted_pan: &str) -> bool;

    fn fingerprint_exists(&self, pan_hash: &str) -> bool;
}

/// Account-holder directory contract.
pub trait OwnerDirectory: Send + Sync {
    fn exists(&self, owner_id: OwnerId) -> bool;
}

/// Concurrent in-memory card store.
///
/// Uniqueness indexes are claimed through the entry API before the card
/// becomes visible, so two racing inserts of the same PAN cannot both
/// succeed.
#[derive(Debug, Default)]
pub struct MemoryCardStore {
    cards: DashMap<CardId, Arc<Card>>,
    pan_index: DashMap<String, CardId>,
    fingerprint_index: DashMap<String, CardId>,
}

impl MemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl CardStore for MemoryCardStore {
    fn find_for_update(&self, id: CardId) -> Option<Arc<Card>> {
        self.cards.get(&id).map(|card| Arc::clone(&card))
    }

    fn insert(&self, card: Card) -> Result<Arc<Card>, CardError> {
        let card = Arc::new(card);

        match self.fingerprint_index.entry(card.pan_hash().to_owned()) {
            Entry::Occupied(_) => return Err(CardError::DuplicateFingerprint),
            Entry::Vacant(entry) => {
                entry.insert(card.id());
            }
        }
        match self.pan_index.entry(card.encrypted_pan().to_owned()) {
            Entry::Occupied(_) => {
                // Release the fingerprint claim taken above.
                self.fingerprint_index.remove(card.pan_hash());
                return Err(CardError::DuplicatePan);
            }
            Entry::Vacant(entry) => {
                entry.insert(card.id());
            }
        }

        self.cards.insert(card.id(), Arc::clone(&card));
        Ok(card)
    }

    fn encrypted_pan_exists(&self, encrypted_pan: &str) -> bool {
        self.pan_index.contains_key(encrypted_pan)
    }

    fn fingerprint_exists(&self, pan_hash: &str) -> bool {
        self.fingerprint_index.contains_key(pan_hash)
    }
}

/// Concurrent in-memory owner directory.
#[derive(Debug, Default)]
pub struct MemoryOwnerDirectory {
    owners: DashMap<OwnerId, ()>,
}

impl MemoryOwnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, owner_id: OwnerId) {
        self.owners.insert(owner_id, ());
    }
}

impl OwnerDirectory for MemoryOwnerDirectory {
    fn exists(&self, owner_id: OwnerId) -> bool {
        self.owners.contains_key(&owner_id)
    }
}
