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

//! # Card Ledger
//!
//! This library provides a card funds-transfer engine with encrypted PAN
//! storage: card numbers are sealed with authenticated encryption before
//! they reach the store, duplicate detection runs on a keyed fingerprint so
//! it never decrypts anything, and transfers move money between two locked
//! cards with an immutable ledger entry per completed move.
//!
//! ## Core Components
//!
//! - [`CardEngine`]: transfers, top-ups, card registration, status changes
//! - [`PanCipher`] / [`PanHasher`]: encrypted-PAN codec and lookup fingerprint
//! - [`Card`]: card record with its status state machine
//! - [`Ledger`] / [`Transaction`]: append-only audit trail
//! - [`CardStore`] / [`OwnerDirectory`]: persistence contracts consumed by
//!   the engine, with in-memory implementations
//!
//! ## Example
//!
//! ```
//! use card_ledger_rs::{CardEngine, CryptoConfig, MemoryCardStore, MemoryOwnerDirectory, OwnerId};
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let config = CryptoConfig::new(
//!     "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
//!     "lookup-pepper",
//! )
//! .unwrap();
//!
//! let store = Arc::new(MemoryCardStore::new());
//! let owners = Arc::new(MemoryOwnerDirectory::new());
//! let owner = OwnerId::random();
//! owners.register(owner);
//!
//! let engine = CardEngine::new(&config, store, owners).unwrap();
//! let expiry = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
//!
//! let from = engine.create_card(owner, "4111 1111 1111 1111", expiry).unwrap();
//! let to = engine.create_card(owner, "5500 0000 0000 0004", expiry).unwrap();
//!
//! engine.top_up(from.id(), dec!(1000.00)).unwrap();
//! let entry = engine.transfer(owner, from.id(), to.id(), dec!(250.00)).unwrap();
//!
//! assert_eq!(from.balance(), dec!(750.00));
//! assert_eq!(to.balance(), dec!(250.00));
//! assert_eq!(entry.amount(), dec!(250.00));
//! ```
//!
//! ## Thread Safety
//!
//! The engine is `Send + Sync`; per-card mutexes serialize balance
//! mutations, and the two locks of a transfer are always acquired in
//! ascending card-id order, so crossing transfers cannot deadlock.

mod base;
pub mod card;
mod config;
mod engine;
pub mod error;
mod ledger;
mod pan_cipher;
mod pan_hasher;
mod store;
mod transaction;

pub use base::{CardId, OwnerId, TransactionId};
pub use card::{Card, CardSnapshot, CardStatus};
pub use config::{CryptoConfig, CryptoConfigError, KEY_ENV, PEPPER_ENV};
pub use engine::CardEngine;
pub use error::{CardError, CardSide, ErrorKind};
pub use ledger::Ledger;
pub use pan_cipher::{CryptoError, DecodedPan, PanCipher};
pub use pan_hasher::{PanHasher, normalize};
pub use store::{CardStore, MemoryCardStore, MemoryOwnerDirectory, OwnerDirectory};
pub use transaction::{Transaction, TransactionStatus};
