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

//! # Billing Ledger
//!
//! This library maintains per-user monetary account balances and debits them
//! in response to externally-priced trip events. Each trip is billed exactly
//! once, balances never go negative, and a daily spending ceiling is
//! enforced even under concurrent updates to the same account.
//!
//! ## Core Components
//!
//! - [`Engine`]: account creation, top-ups, idempotent trip debits, daily reset
//! - [`Account`]: per-user balance record with daily spend tracking
//! - [`Store`]: storage contract combining the account store and the
//!   append-only transaction ledger, with an atomic paired commit
//! - [`MemoryStore`]: in-memory implementation of the storage contracts
//! - [`EventPublisher`]: best-effort outcome notifications
//!
//! ## Example
//!
//! ```
//! use billing_ledger_rs::{Engine, TripId, TripPricedEvent, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::in_memory();
//!
//! engine.create_account(UserId(1), None).unwrap();
//! engine.top_up(UserId(1), dec!(10000.00), None).unwrap();
//!
//! engine
//!     .process_debit(&TripPricedEvent {
//!         trip_id: TripId::new("TRIP-001"),
//!         user_id: UserId(1),
//!         final_amount: dec!(500.00),
//!     })
//!     .unwrap();
//!
//! let account = engine.get_account(UserId(1)).unwrap();
//! assert_eq!(account.balance, dec!(9500.00));
//! assert_eq!(account.daily_spent, dec!(500.00));
//! ```
//!
//! ## Concurrency
//!
//! The same account may be hit by a top-up and a debit in parallel. Writers
//! carry an optimistic version token checked by the store; a stale write is
//! rejected and the engine re-reads, re-checks, and re-applies. Trip-id
//! uniqueness in the ledger makes duplicate deliveries from an
//! at-least-once broker safe.

pub mod account;
mod base;
mod config;
mod engine;
pub mod error;
pub mod events;
pub mod store;
mod transaction;

pub use account::Account;
pub use base::{AccountId, TransactionId, TripId, UserId};
pub use config::Config;
pub use engine::{Engine, MAX_WRITE_RETRIES, ResetOutcome};
pub use error::{BillingError, StoreError};
pub use events::{
    AccountCreditedEvent, EventPublisher, MemoryPublisher, NullPublisher, PaymentEvent,
    PaymentStatus, TripPricedEvent,
};
pub use store::{AccountStore, AccountWrite, MemoryStore, Store, TransactionLedger};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
