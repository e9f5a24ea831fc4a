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

//! Storage contracts and the in-memory store.
//!
//! Two abstractions back the engine: [`AccountStore`] for the single
//! contended account row per user, and [`TransactionLedger`] for the
//! append-only record of every attempt. [`Store`] ties them together with an
//! all-or-nothing [`commit`](Store::commit) spanning one account write and
//! one ledger append — the scoped-transaction boundary each engine operation
//! runs inside.
//!
//! # Concurrency contract
//!
//! Account writes carry the version the writer read. A write against a stale
//! version fails with [`StoreError::VersionConflict`] and must be retried
//! from a fresh read. The ledger enforces trip-id uniqueness at append time;
//! the losing writer of a duplicate-trip race gets
//! [`StoreError::DuplicateTrip`] and treats the event as already processed.

use crate::account::Account;
use crate::base::{AccountId, TransactionId, TripId, UserId};
use crate::error::StoreError;
use crate::transaction::Transaction;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

/// An account mutation paired with the version token it was read at.
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account: Account,
    pub expected_version: u64,
}

impl AccountWrite {
    /// Captures the snapshot's version as the expected token. Mutation
    /// helpers never touch `version`, so building the write from the mutated
    /// snapshot still carries the version it was read at.
    pub fn new(account: Account) -> Self {
        let expected_version = account.version;
        Self {
            account,
            expected_version,
        }
    }
}

/// Durable keyed storage of one account row per user.
pub trait AccountStore: Send + Sync {
    /// Looks up the account owned by `user_id`.
    fn find_by_user(&self, user_id: UserId) -> Result<Option<Account>, StoreError>;

    /// Inserts a new account. Fails with [`StoreError::DuplicateUser`] when a
    /// row already exists for the owner.
    fn insert(&self, account: Account) -> Result<Account, StoreError>;

    /// Compare-and-swap write: succeeds and bumps the version only when the
    /// stored version equals `expected_version`, otherwise fails with
    /// [`StoreError::VersionConflict`]. Stamps `updated_at` on success.
    fn write(&self, write: AccountWrite) -> Result<Account, StoreError>;

    /// All known account owners, for the daily reset sweep.
    fn user_ids(&self) -> Result<Vec<UserId>, StoreError>;
}

/// Append-only record store keyed for idempotency by trip id.
pub trait TransactionLedger: Send + Sync {
    /// Looks up the recorded outcome for a trip, if any.
    fn find_by_trip(&self, trip_id: &TripId) -> Result<Option<Transaction>, StoreError>;

    /// Looks up a record by its own id.
    fn find(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Appends a record. Fails with [`StoreError::DuplicateTrip`] when the
    /// record carries a trip id that is already present.
    fn append(&self, record: Transaction) -> Result<Transaction, StoreError>;

    /// Records touching `account_id`, in append order.
    fn for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError>;
}

/// Storage backend offering the atomic unit each engine operation needs:
/// one account write plus one ledger append, committing together or not at
/// all.
pub trait Store: AccountStore + TransactionLedger {
    /// Commits `write` and `record` as one unit. A version conflict or a
    /// duplicate trip id leaves both stores untouched.
    fn commit(
        &self,
        write: AccountWrite,
        record: Transaction,
    ) -> Result<(Account, Transaction), StoreError>;
}

/// In-memory [`Store`] backed by concurrent maps.
///
/// Reads go straight to the maps; writes serialize on a single mutex, which
/// is what makes the paired commit all-or-nothing. The version token still
/// does the real concurrency work: a writer holding a stale snapshot is
/// rejected no matter how the writes interleave.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<UserId, Account>,
    transactions: DashMap<TransactionId, Transaction>,
    by_trip: DashMap<TripId, TransactionId>,
    /// Ledger append order; ids only, records live in `transactions`.
    order: Mutex<Vec<TransactionId>>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the ledger.
    pub fn ledger_len(&self) -> usize {
        self.transactions.len()
    }

    /// Number of account rows.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn check_version(&self, write: &AccountWrite) -> Result<(), StoreError> {
        let stored = self
            .accounts
            .get(&write.account.user_id)
            .ok_or_else(|| StoreError::Unavailable("account row missing".to_string()))?;
        if stored.version != write.expected_version {
            return Err(StoreError::VersionConflict);
        }
        Ok(())
    }

    /// Applies an already-validated account write. Caller holds `write_lock`.
    fn apply_write(&self, write: AccountWrite) -> Account {
        let mut account = write.account;
        account.version = write.expected_version + 1;
        account.updated_at = Utc::now();
        self.accounts.insert(account.user_id, account.clone());
        account
    }

    /// Applies an already-validated append. Caller holds `write_lock`.
    fn apply_append(&self, record: Transaction) -> Transaction {
        if let Some(trip_id) = &record.trip_id {
            self.by_trip.insert(trip_id.clone(), record.id);
        }
        self.transactions.insert(record.id, record.clone());
        self.order.lock().push(record.id);
        record
    }

    fn check_trip_unique(&self, record: &Transaction) -> Result<(), StoreError> {
        if let Some(trip_id) = &record.trip_id {
            if self.by_trip.contains_key(trip_id) {
                return Err(StoreError::DuplicateTrip(trip_id.clone()));
            }
        }
        Ok(())
    }
}

impl AccountStore for MemoryStore {
    fn find_by_user(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&user_id).map(|a| a.value().clone()))
    }

    fn insert(&self, account: Account) -> Result<Account, StoreError> {
        let _guard = self.write_lock.lock();
        if self.accounts.contains_key(&account.user_id) {
            return Err(StoreError::DuplicateUser(account.user_id));
        }
        self.accounts.insert(account.user_id, account.clone());
        Ok(account)
    }

    fn write(&self, write: AccountWrite) -> Result<Account, StoreError> {
        let _guard = self.write_lock.lock();
        self.check_version(&write)?;
        Ok(self.apply_write(write))
    }

    fn user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        Ok(self.accounts.iter().map(|entry| *entry.key()).collect())
    }
}

impl TransactionLedger for MemoryStore {
    fn find_by_trip(&self, trip_id: &TripId) -> Result<Option<Transaction>, StoreError> {
        let Some(id) = self.by_trip.get(trip_id).map(|id| *id.value()) else {
            return Ok(None);
        };
        Ok(self.transactions.get(&id).map(|tx| tx.value().clone()))
    }

    fn find(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.get(&id).map(|tx| tx.value().clone()))
    }

    fn append(&self, record: Transaction) -> Result<Transaction, StoreError> {
        let _guard = self.write_lock.lock();
        self.check_trip_unique(&record)?;
        Ok(self.apply_append(record))
    }

    fn for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError> {
        let order = self.order.lock();
        Ok(order
            .iter()
            .filter_map(|id| self.transactions.get(id))
            .filter(|tx| tx.value().account_id == Some(account_id))
            .map(|tx| tx.value().clone())
            .collect())
    }
}

impl Store for MemoryStore {
    fn commit(
        &self,
        write: AccountWrite,
        record: Transaction,
    ) -> Result<(Account, Transaction), StoreError> {
        let _guard = self.write_lock.lock();
        // Validate both halves before touching anything.
        self.check_version(&write)?;
        self.check_trip_unique(&record)?;
        let account = self.apply_write(write);
        let record = self.apply_append(record);
        Ok((account, record))
    }
}
