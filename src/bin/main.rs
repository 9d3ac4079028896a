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

use card_ledger_rs::{
    CardEngine, CardError, CardId, CardStatus, CryptoConfig, CryptoConfigError, MemoryCardStore,
    MemoryOwnerDirectory, OwnerDirectory, OwnerId,
};
use chrono::NaiveDate;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Card Ledger - Replay card operations from a CSV file
///
/// Reads owner registrations, card creations, top-ups, transfers, and
/// status changes from a CSV file and outputs the resulting card states to
/// stdout. Requires ENCRYPT_SECRET (base64 32-byte key) and PAN_PEPPER in
/// the environment.
#[derive(Parser, Debug)]
#[command(name = "card-ledger-rs")]
#[command(about = "Replays card operations from a CSV and prints card states", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,owner,card,pan,expiry,to,amount,status
    /// Example: cargo run -- operations.csv > cards.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Missing or malformed key material is fatal: nothing may be served
    // without it.
    let config = match CryptoConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal configuration error: {}", e);
            process::exit(1);
        }
    };

    let mut harness = match Harness::new(&config) {
        Ok(harness) => harness,
        Err(e) => {
            eprintln!("Fatal configuration error: {}", e);
            process::exit(1);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_operations(BufReader::new(file), &mut harness) {
        eprintln!("Error processing operations: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_cards(&harness, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, owner, card, pan, expiry, to, amount, status`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    owner: Option<String>,
    card: Option<String>,
    pan: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    expiry: Option<NaiveDate>,
    to: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    status: Option<String>,
}

/// One resolved operation from the input file.
#[derive(Debug)]
enum Operation {
    RegisterOwner { label: String },
    CreateCard { owner: String, label: String, pan: String, expiry: NaiveDate },
    TopUp { card: String, amount: Decimal },
    Transfer { owner: String, from: String, to: String, amount: Decimal },
    RequestBlock { owner: String, card: String },
    SetStatus { card: String, status: CardStatus },
}

impl CsvRecord {
    /// Converts this record into an operation.
    ///
    /// Returns `None` for unknown operation names or missing required
    /// fields; such rows are skipped.
    fn into_operation(self) -> Option<Operation> {
        fn non_blank(field: Option<String>) -> Option<String> {
            field.filter(|s| !s.is_empty())
        }

        match self.op.to_lowercase().as_str() {
            "owner" => Some(Operation::RegisterOwner {
                label: non_blank(self.owner)?,
            }),
            "card" => Some(Operation::CreateCard {
                owner: non_blank(self.owner)?,
                label: non_blank(self.card)?,
                pan: non_blank(self.pan)?,
                expiry: self.expiry?,
            }),
            "topup" => Some(Operation::TopUp {
                card: non_blank(self.card)?,
                amount: self.amount?,
            }),
            "transfer" => Some(Operation::Transfer {
                owner: non_blank(self.owner)?,
                from: non_blank(self.card)?,
                to: non_blank(self.to)?,
                amount: self.amount?,
            }),
            "block" => Some(Operation::RequestBlock {
                owner: non_blank(self.owner)?,
                card: non_blank(self.card)?,
            }),
            "status" => Some(Operation::SetStatus {
                card: non_blank(self.card)?,
                status: match non_blank(self.status)?.as_str() {
                    "ACTIVE" => CardStatus::Active,
                    "BLOCK_REQUESTED" => CardStatus::BlockRequested,
                    "BLOCKED" => CardStatus::Blocked,
                    _ => return None,
                },
            }),
            _ => None,
        }
    }
}

/// Replay failures for a single row.
#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("unknown {0} label '{1}'")]
    UnknownLabel(&'static str, String),

    #[error("label '{0}' already in use")]
    DuplicateLabel(String),

    #[error(transparent)]
    Card(#[from] CardError),
}

/// Engine plus the label maps that tie CSV rows to generated identifiers.
struct Harness {
    engine: CardEngine,
    owners: Arc<MemoryOwnerDirectory>,
    owner_labels: HashMap<String, OwnerId>,
    card_labels: HashMap<String, CardId>,
    /// Card labels in creation order, for stable output.
    card_order: Vec<String>,
}

impl Harness {
    fn new(config: &CryptoConfig) -> Result<Self, CryptoConfigError> {
        let store = Arc::new(MemoryCardStore::new());
        let owners = Arc::new(MemoryOwnerDirectory::new());
        let engine = CardEngine::new(config, store, Arc::clone(&owners) as Arc<dyn OwnerDirectory>)?;
        Ok(Self {
            engine,
            owners,
            owner_labels: HashMap::new(),
            card_labels: HashMap::new(),
            card_order: Vec::new(),
        })
    }

    fn owner(&self, label: &str) -> Result<OwnerId, ReplayError> {
        self.owner_labels
            .get(label)
            .copied()
            .ok_or_else(|| ReplayError::UnknownLabel("owner", label.to_owned()))
    }

    fn card(&self, label: &str) -> Result<CardId, ReplayError> {
        self.card_labels
            .get(label)
            .copied()
            .ok_or_else(|| ReplayError::UnknownLabel("card", label.to_owned()))
    }

    fn apply(&mut self, operation: Operation) -> Result<(), ReplayError> {
        match operation {
            Operation::RegisterOwner { label } => {
                if self.owner_labels.contains_key(&label) {
                    return Err(ReplayError::DuplicateLabel(label));
                }
                let owner_id = OwnerId::random();
                self.owners.register(owner_id);
                self.owner_labels.insert(label, owner_id);
            }
            Operation::CreateCard { owner, label, pan, expiry } => {
                let owner_id = self.owner(&owner)?;
                if self.card_labels.contains_key(&label) {
                    return Err(ReplayError::DuplicateLabel(label));
                }
                let card = self.engine.create_card(owner_id, &pan, expiry)?;
                self.card_labels.insert(label.clone(), card.id());
                self.card_order.push(label);
            }
            Operation::TopUp { card, amount } => {
                let card_id = self.card(&card)?;
                self.engine.top_up(card_id, amount)?;
            }
            Operation::Transfer { owner, from, to, amount } => {
                let owner_id = self.owner(&owner)?;
                let from_id = self.card(&from)?;
                let to_id = self.card(&to)?;
                self.engine.transfer(owner_id, from_id, to_id, amount)?;
            }
            Operation::RequestBlock { owner, card } => {
                let owner_id = self.owner(&owner)?;
                let card_id = self.card(&card)?;
                self.engine.request_block(card_id, owner_id)?;
            }
            Operation::SetStatus { card, status } => {
                let card_id = self.card(&card)?;
                self.engine.admin_set_status(card_id, status)?;
            }
        }
        Ok(())
    }
}

/// Processes operations from a CSV reader.
///
/// Streaming, so arbitrarily large input files never load fully into
/// memory. Malformed rows and rejected operations are skipped without
/// stopping the replay.
///
/// # CSV Format
///
/// Columns: `op, owner, card, pan, expiry, to, amount, status`
///
/// ```csv
/// op,owner,card,pan,expiry,to,amount,status
/// owner,alice,,,,,,
/// card,alice,c1,4111 1111 1111 1111,2099-01-01,,,
/// topup,,c1,,,,1000.00,
/// transfer,alice,c1,,,c2,250.00,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader itself fails; individual row failures
/// only produce log events.
fn process_operations<R: Read>(reader: R, harness: &mut Harness) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(operation) = record.into_operation() else {
                    warn!("skipping invalid operation record");
                    continue;
                };
                if let Err(e) = harness.apply(operation) {
                    warn!("skipping operation: {}", e);
                }
            }
            Err(e) => {
                warn!("skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// Output row for one card.
#[derive(Debug, serde::Serialize)]
struct CardRow {
    card: String,
    masked_number: String,
    expiry: NaiveDate,
    status: CardStatus,
    balance: Decimal,
}

/// Writes card states to a CSV writer, in card creation order.
fn write_cards<W: Write>(harness: &Harness, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for label in &harness.card_order {
        let Some(card_id) = harness.card_labels.get(label) else {
            continue;
        };
        let Some(card) = harness.engine.card(*card_id) else {
            continue;
        };
        let snapshot = card.snapshot();
        wtr.serialize(CardRow {
            card: label.clone(),
            masked_number: snapshot.masked_number,
            expiry: snapshot.expiry_date,
            status: snapshot.status,
            balance: snapshot.balance.round_dp(2),
        })?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const HEADER: &str = "op,owner,card,pan,expiry,to,amount,status\n";

    fn harness() -> Harness {
        let config = CryptoConfig::new(
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
            "test-pepper",
        )
        .unwrap();
        Harness::new(&config).unwrap()
    }

    fn replay(csv: &str) -> Harness {
        let mut harness = harness();
        process_operations(Cursor::new(csv), &mut harness).unwrap();
        harness
    }

    fn balance(harness: &Harness, label: &str) -> Decimal {
        let id = harness.card_labels[label];
        harness.engine.card(id).unwrap().balance()
    }

    #[test]
    fn replay_topup_and_transfer() {
        let csv = format!(
            "{HEADER}\
             owner,alice,,,,,,\n\
             card,alice,c1,4111 1111 1111 1111,2099-01-01,,,\n\
             card,alice,c2,5500 0000 0000 0004,2099-01-01,,,\n\
             topup,,c1,,,,1000.00,\n\
             transfer,alice,c1,,,c2,250.00,\n"
        );
        let harness = replay(&csv);

        assert_eq!(balance(&harness, "c1"), dec!(750.00));
        assert_eq!(balance(&harness, "c2"), dec!(250.00));
    }

    #[test]
    fn rejected_operations_are_skipped() {
        let csv = format!(
            "{HEADER}\
             owner,alice,,,,,,\n\
             card,alice,c1,4111 1111 1111 1111,2099-01-01,,,\n\
             card,alice,c2,5500 0000 0000 0004,2099-01-01,,,\n\
             topup,,c1,,,,100.00,\n\
             transfer,alice,c1,,,c2,5000.00,\n\
             transfer,alice,c1,,,c2,40.00,\n"
        );
        let harness = replay(&csv);

        // The overdrawn transfer is skipped; the valid one applies.
        assert_eq!(balance(&harness, "c1"), dec!(60.00));
        assert_eq!(balance(&harness, "c2"), dec!(40.00));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let csv = format!(
            "{HEADER}\
             owner,alice,,,,,,\n\
             garbage,row,data\n\
             card,alice,c1,4111 1111 1111 1111,2099-01-01,,,\n\
             card,alice,dup-pan,4111 1111 1111 1111,2099-01-01,,,\n\
             topup,,c1,,,,12.34,\n"
        );
        let harness = replay(&csv);

        assert_eq!(harness.card_order, vec!["c1".to_owned()]);
        assert_eq!(balance(&harness, "c1"), dec!(12.34));
    }

    #[test]
    fn status_rows_drive_the_state_machine() {
        let csv = format!(
            "{HEADER}\
             owner,alice,,,,,,\n\
             card,alice,c1,4111 1111 1111 1111,2099-01-01,,,\n\
             block,alice,c1,,,,,\n\
             status,,c1,,,,,BLOCKED\n\
             topup,,c1,,,,10.00,\n"
        );
        let harness = replay(&csv);

        let id = harness.card_labels["c1"];
        let card = harness.engine.card(id).unwrap();
        assert_eq!(card.status(), CardStatus::Blocked);
        // Top-up against the blocked card was rejected and skipped.
        assert_eq!(card.balance(), Decimal::ZERO);
    }

    #[test]
    fn write_cards_emits_masked_numbers() {
        let csv = format!(
            "{HEADER}\
             owner,alice,,,,,,\n\
             card,alice,c1,4111 1111 1111 1111,2099-01-01,,,\n"
        );
        let harness = replay(&csv);

        let mut output = Vec::new();
        write_cards(&harness, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();

        assert!(output.contains("card,masked_number,expiry,status,balance"));
        assert!(output.contains("**** **** **** 1111"));
        assert!(!output.contains("4111111111111111"));
    }
}
