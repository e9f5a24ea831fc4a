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

//! Property-based tests for the billing ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! top-ups and trip debits: balances never go negative, the daily spend
//! never exceeds the cap, the ledger reconciles with the balance, and
//! replaying a stream of events is idempotent.

use billing_ledger_rs::{
    Config, Engine, MemoryPublisher, MemoryStore, TransactionLedger, TransactionStatus,
    TransactionType, TripId, TripPricedEvent, UserId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 100.00, scale 2).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// One billing operation against a single account.
#[derive(Debug, Clone)]
enum Op {
    TopUp(Decimal),
    Debit(Decimal),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![arb_amount().prop_map(Op::TopUp), arb_amount().prop_map(Op::Debit)]
}

/// Engine with a deliberately small cap so trims and cap failures are easy
/// to reach.
fn small_cap_engine() -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let config = Config {
        daily_cap: dec!(100.00),
        default_currency: "XOF".to_string(),
    };
    (Engine::new(store.clone(), publisher, config), store)
}

fn apply_ops(engine: &Engine, ops: &[Op]) {
    let user = UserId(1);
    engine.create_account(user, None).unwrap();
    for (i, op) in ops.iter().enumerate() {
        match op {
            Op::TopUp(amount) => {
                engine.top_up(user, *amount, None).unwrap();
            }
            Op::Debit(amount) => {
                engine
                    .process_debit(&TripPricedEvent {
                        trip_id: TripId::new(format!("TRIP-{i}")),
                        user_id: user,
                        final_amount: *amount,
                    })
                    .unwrap();
            }
        }
    }
}

// =============================================================================
// Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Balance never goes negative for any operation sequence.
    #[test]
    fn balance_never_negative(ops in prop::collection::vec(arb_op(), 1..30)) {
        let (engine, _store) = small_cap_engine();
        apply_ops(&engine, &ops);

        let account = engine.get_account(UserId(1)).unwrap();
        prop_assert!(account.balance >= Decimal::ZERO);
    }

    /// Daily spend never exceeds the cap, trims included.
    #[test]
    fn daily_spent_never_exceeds_cap(ops in prop::collection::vec(arb_op(), 1..30)) {
        let (engine, _store) = small_cap_engine();
        apply_ops(&engine, &ops);

        let account = engine.get_account(UserId(1)).unwrap();
        prop_assert!(account.daily_spent >= Decimal::ZERO);
        prop_assert!(account.daily_spent <= dec!(100.00));
    }

    /// Successful credits minus successful debits reconcile with the balance,
    /// and successful debits reconcile with the daily spend.
    #[test]
    fn ledger_reconciles_with_account(ops in prop::collection::vec(arb_op(), 1..30)) {
        let (engine, store) = small_cap_engine();
        apply_ops(&engine, &ops);

        let account = engine.get_account(UserId(1)).unwrap();
        let records = store.for_account(account.id).unwrap();

        let mut credits = Decimal::ZERO;
        let mut debits = Decimal::ZERO;
        for record in &records {
            if record.status == TransactionStatus::Success {
                match record.kind {
                    TransactionType::Credit => credits += record.amount,
                    TransactionType::Debit => debits += record.amount,
                }
            }
        }

        prop_assert_eq!(account.balance, credits - debits);
        prop_assert_eq!(account.daily_spent, debits);
    }

    /// Failure records never change account state: replaying any suffix of
    /// already-processed events leaves the account exactly as it was.
    #[test]
    fn replaying_events_is_idempotent(
        ops in prop::collection::vec(arb_op(), 1..20),
    ) {
        let (engine, store) = small_cap_engine();
        apply_ops(&engine, &ops);

        let before = engine.get_account(UserId(1)).unwrap();
        let ledger_before = store.ledger_len();

        // Replay every debit event verbatim.
        for (i, op) in ops.iter().enumerate() {
            if let Op::Debit(amount) = op {
                engine
                    .process_debit(&TripPricedEvent {
                        trip_id: TripId::new(format!("TRIP-{i}")),
                        user_id: UserId(1),
                        final_amount: *amount,
                    })
                    .unwrap();
            }
        }

        let after = engine.get_account(UserId(1)).unwrap();
        prop_assert_eq!(before, after);
        prop_assert_eq!(store.ledger_len(), ledger_before);
    }

    /// A single debit against a fresh account applies the smaller of the
    /// request and the cap, or fails cleanly.
    #[test]
    fn first_debit_is_capped_by_headroom(amount in arb_amount(), funding in arb_amount()) {
        let (engine, _store) = small_cap_engine();
        let user = UserId(1);
        engine.create_account(user, None).unwrap();
        engine.top_up(user, funding, None).unwrap();

        engine
            .process_debit(&TripPricedEvent {
                trip_id: TripId::new("TRIP-0"),
                user_id: user,
                final_amount: amount,
            })
            .unwrap();

        let account = engine.get_account(user).unwrap();
        if funding < amount {
            // Insufficient balance: nothing applied.
            prop_assert_eq!(account.balance, funding);
            prop_assert_eq!(account.daily_spent, Decimal::ZERO);
        } else {
            // Applied in full; the 100.00 cap cannot trim a <= 100.00 amount.
            prop_assert_eq!(account.balance, funding - amount);
            prop_assert_eq!(account.daily_spent, amount);
        }
    }
}
