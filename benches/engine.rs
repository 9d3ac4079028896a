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

//! Benchmarks for the card transfer engine and the PAN codec.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - PAN sealing, opening, and fingerprinting
//! - Card registration
//! - Single-threaded transfer processing
//! - Multi-threaded transfers with and without lock contention

use card_ledger_rs::{
    CardEngine, CardId, CryptoConfig, MemoryCardStore, MemoryOwnerDirectory, OwnerDirectory,
    OwnerId, PanCipher, PanHasher,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const KEY_B64: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

// =============================================================================
// Helper Functions
// =============================================================================

fn config() -> CryptoConfig {
    CryptoConfig::new(KEY_B64, "bench-pepper").unwrap()
}

fn pan(n: u64) -> String {
    format!("4111{:012}", n)
}

/// Builds an engine with `count` cards for one owner, each funded with
/// `balance`.
fn engine_with_cards(count: u64, balance: Decimal) -> (Arc<CardEngine>, OwnerId, Vec<CardId>) {
    let store = Arc::new(MemoryCardStore::new());
    let owners = Arc::new(MemoryOwnerDirectory::new());
    let engine = Arc::new(
        CardEngine::new(&config(), store, Arc::clone(&owners) as Arc<dyn OwnerDirectory>).unwrap(),
    );

    let owner = OwnerId::random();
    owners.register(owner);

    let expiry = chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
    let cards = (0..count)
        .map(|n| {
            let card = engine.create_card(owner, &pan(n), expiry).unwrap();
            if balance > Decimal::ZERO {
                engine.top_up(card.id(), balance).unwrap();
            }
            card.id()
        })
        .collect();

    (engine, owner, cards)
}

// =============================================================================
// Codec Benchmarks
// =============================================================================

fn bench_pan_seal(c: &mut Criterion) {
    let cipher = PanCipher::new(&config()).unwrap();

    c.bench_function("pan_seal", |b| {
        b.iter(|| cipher.encrypt(black_box("4111111111111111")).unwrap())
    });
}

fn bench_pan_open(c: &mut Criterion) {
    let cipher = PanCipher::new(&config()).unwrap();
    let blob = cipher.encrypt("4111111111111111").unwrap();

    c.bench_function("pan_open", |b| b.iter(|| cipher.decrypt(black_box(&blob))));
}

fn bench_pan_passthrough(c: &mut Criterion) {
    let cipher = PanCipher::new(&config()).unwrap();

    // Legacy plaintext never reaches the AEAD; this measures the structural
    // gate alone.
    c.bench_function("pan_passthrough", |b| {
        b.iter(|| cipher.decrypt(black_box("4111 1111 1111 1111")))
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let hasher = PanHasher::new(&config());

    c.bench_function("fingerprint", |b| {
        b.iter(|| hasher.fingerprint(black_box("4111111111111111")))
    });
}

// =============================================================================
// Registration Benchmarks
// =============================================================================

fn bench_create_card(c: &mut Criterion) {
    let (engine, owner, _) = engine_with_cards(0, Decimal::ZERO);
    let expiry = chrono::NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
    let counter = AtomicU64::new(0);

    c.bench_function("create_card", |b| {
        b.iter(|| {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            engine.create_card(owner, &pan(n), expiry).unwrap()
        })
    });
}

// =============================================================================
// Single-Threaded Transfer Benchmarks
// =============================================================================

fn bench_single_transfer(c: &mut Criterion) {
    // Funded far beyond what any benchmark run can drain.
    let (engine, owner, cards) = engine_with_cards(2, dec!(1000000000.00));
    let (from, to) = (cards[0], cards[1]);

    c.bench_function("single_transfer", |b| {
        b.iter(|| {
            engine
                .transfer(owner, black_box(from), black_box(to), dec!(0.01))
                .unwrap()
        })
    });
}

fn bench_transfer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_throughput");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (engine, owner, cards) = engine_with_cards(2, dec!(1000000000.00));
                for _ in 0..count {
                    engine.transfer(owner, cards[0], cards[1], dec!(0.01)).unwrap();
                }
                black_box(&engine);
            })
        });
    }
    group.finish();
}

fn bench_top_up(c: &mut Criterion) {
    let (engine, _, cards) = engine_with_cards(1, Decimal::ZERO);
    let card = cards[0];

    c.bench_function("top_up", |b| {
        b.iter(|| engine.top_up(black_box(card), dec!(0.01)).unwrap())
    });
}

// =============================================================================
// Multi-Threaded Transfer Benchmarks
// =============================================================================

fn bench_parallel_transfers_disjoint_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_transfers_disjoint_pairs");

    for num_pairs in [4, 16, 64].iter() {
        let transfers_per_pair = 100u64;
        group.throughput(Throughput::Elements(*num_pairs as u64 * transfers_per_pair));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_pairs),
            num_pairs,
            |b, &num_pairs| {
                b.iter(|| {
                    let (engine, owner, cards) =
                        engine_with_cards(num_pairs as u64 * 2, dec!(1000000.00));

                    // Each pair of cards is touched by exactly one rayon
                    // task; no two tasks contend on a lock.
                    (0..num_pairs as usize).into_par_iter().for_each(|pair| {
                        let from = cards[pair * 2];
                        let to = cards[pair * 2 + 1];
                        for _ in 0..transfers_per_pair {
                            engine.transfer(owner, from, to, dec!(0.01)).unwrap();
                        }
                    });

                    black_box(&engine);
                })
            },
        );
    }
    group.finish();
}

fn bench_parallel_transfers_same_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_transfers_same_pair");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (engine, owner, cards) = engine_with_cards(2, dec!(1000000000.00));
                let (a, b_card) = (cards[0], cards[1]);

                // Every task fights over the same two row locks, half of
                // them in each direction.
                (0..count).into_par_iter().for_each(|i| {
                    let (from, to) = if i % 2 == 0 { (a, b_card) } else { (b_card, a) };
                    let _ = engine.transfer(owner, from, to, dec!(0.01));
                });

                black_box(&engine);
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_pan_seal,
    bench_pan_open,
    bench_pan_passthrough,
    bench_fingerprint,
    bench_create_card,
    bench_single_transfer,
    bench_transfer_throughput,
    bench_top_up,
    bench_parallel_transfers_disjoint_pairs,
    bench_parallel_transfers_same_pair,
);
criterion_main!(benches);
