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

//! Immutable ledger entries.
//!
//! A [`Transaction`] is written exactly once per successful transfer and
//! never updated or deleted afterwards; together the entries form an
//! append-only audit trail. All fields are private and exposed through
//! accessors only.

use crate::base::{CardId, OwnerId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome recorded on a ledger entry.
///
/// This engine only ever writes `Success`; `Failed` exists so collaborators
/// recording rejected attempts share the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Failed,
}

/// One completed funds movement between two cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    id: TransactionId,
    owner_id: OwnerId,
    from_card: CardId,
    to_card: CardId,
    amount: Decimal,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    message: String,
}

impl Transaction {
    pub(crate) fn new(
        owner_id: OwnerId,
        from_card: CardId,
        to_card: CardId,
        amount: Decimal,
        status: TransactionStatus,
        created_at: DateTime<Utc>,
        message: String,
    ) -> Self {
        Self {
            id: TransactionId::random(),
            owner_id,
            from_card,
            to_card,
            amount,
            status,
            created_at,
            message,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn from_card(&self) -> CardId {
        self.from_card
    }

    pub fn to_card(&self) -> CardId {
        self.to_card
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when this entry debited or credited the given card.
    pub fn touches(&self, card_id: CardId) -> bool {
        self.from_card == card_id || self.to_card == card_id
    }
}
