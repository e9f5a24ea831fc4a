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

//! Billing ledger engine.
//!
//! The [`Engine`] is the central component: it creates accounts, credits
//! top-ups, debits priced trips, and sweeps the daily spend counters. It
//! depends only on the storage contracts and the publisher seam, all passed
//! in at construction.
//!
//! # Debit processing
//!
//! A priced-trip event runs through a fixed decision order: idempotency
//! check, account resolution, balance check, daily-cap check, cap trimming,
//! apply. Business failures (missing account, insufficient balance,
//! exhausted cap) are recovered locally into a FAILED ledger record plus a
//! failed-outcome event — they are deterministic outcomes, and redelivering
//! the message would only replay them. Infrastructure failures propagate so
//! the adapter's retry or dead-letter handling can engage.
//!
//! # Concurrency
//!
//! Every account mutation commits through the store's compare-and-swap
//! contract together with its ledger record, as one atomic unit. A version
//! conflict re-reads the account and re-runs the checks, bounded by
//! [`MAX_WRITE_RETRIES`]; a duplicate-trip conflict at commit time means a
//! concurrent delivery won the race and is treated exactly like the
//! idempotency short-circuit.

use crate::account::Account;
use crate::base::{AccountId, TripId, UserId};
use crate::config::Config;
use crate::error::{BillingError, StoreError};
use crate::events::{EventPublisher, NullPublisher, TripPricedEvent};
use crate::store::{AccountWrite, MemoryStore, Store};
use crate::transaction::Transaction;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Upper bound on optimistic-concurrency retries per operation.
pub const MAX_WRITE_RETRIES: usize = 5;

/// Result of a daily reset sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Accounts whose daily spend was reset (or already zero).
    pub reset: usize,
    /// Accounts skipped after exhausting retries; they catch up on the next
    /// sweep.
    pub skipped: usize,
}

/// Billing engine over an account store, a transaction ledger, and an event
/// publisher.
pub struct Engine {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    config: Config,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn EventPublisher>, config: Config) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Engine over a fresh in-memory store, dropping outbound events. Handy
    /// for tests and benchmarks.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NullPublisher),
            Config::default(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates an account for `user_id`, or returns the existing one
    /// unchanged. Idempotent; a concurrent double-create resolves to the
    /// winner's row.
    pub fn create_account(
        &self,
        user_id: UserId,
        currency: Option<&str>,
    ) -> Result<Account, BillingError> {
        if let Some(existing) = self.store.find_by_user(user_id)? {
            tracing::warn!(%user_id, "account already exists");
            return Ok(existing);
        }

        let currency = currency
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(self.config.default_currency.as_str());

        match self.store.insert(Account::new(user_id, currency)) {
            Ok(account) => {
                tracing::info!(%user_id, account_id = %account.id, "account created");
                Ok(account)
            }
            // Lost a concurrent create; the winner's row is the account.
            Err(StoreError::DuplicateUser(_)) => self
                .store
                .find_by_user(user_id)?
                .ok_or(BillingError::AccountNotFound(user_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Credits `amount` to the user's account and appends a SUCCESS/CREDIT
    /// record, atomically. Caps apply to spend only, never to top-ups.
    pub fn top_up(
        &self,
        user_id: UserId,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<Account, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount);
        }
        let description = description.unwrap_or("Account top-up");

        for _ in 0..MAX_WRITE_RETRIES {
            let account = self
                .store
                .find_by_user(user_id)?
                .ok_or(BillingError::AccountNotFound(user_id))?;

            let mut updated = account.clone();
            updated.credit(amount);
            let record = Transaction::credit(account.id, amount, description);

            match self.store.commit(AccountWrite::new(updated), record) {
                Ok((stored, _)) => {
                    tracing::info!(%user_id, %amount, balance = %stored.balance, "top-up credited");
                    self.publisher.account_credited(user_id, amount);
                    return Ok(stored);
                }
                Err(StoreError::VersionConflict) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(BillingError::ConcurrencyConflict)
    }

    /// Processes a priced-trip event. Billing each trip at most once is
    /// guaranteed by the ledger's trip-id uniqueness; duplicate deliveries
    /// return silently.
    pub fn process_debit(&self, event: &TripPricedEvent) -> Result<(), BillingError> {
        tracing::info!(
            trip_id = %event.trip_id,
            user_id = %event.user_id,
            amount = %event.final_amount,
            "processing debit"
        );

        // Idempotency: any recorded outcome for this trip, success or
        // failure, means the event was already handled.
        if self.store.find_by_trip(&event.trip_id)?.is_some() {
            tracing::warn!(trip_id = %event.trip_id, "duplicate TRIP_PRICED event, skipping");
            return Ok(());
        }

        let Some(mut account) = self.store.find_by_user(event.user_id)? else {
            tracing::error!(user_id = %event.user_id, "no account for debit");
            let reason = BillingError::AccountNotFound(event.user_id).to_string();
            return self.record_failure(None, event, &reason);
        };

        for _ in 0..MAX_WRITE_RETRIES {
            let applied = match self.evaluate_debit(&account, event.final_amount) {
                Ok(applied) => applied,
                Err(err) => {
                    debug_assert!(err.is_business_failure());
                    tracing::warn!(trip_id = %event.trip_id, %err, "debit failed");
                    return self.record_failure(Some(account.id), event, &err.to_string());
                }
            };

            let mut updated = account.clone();
            updated.debit(applied);
            let record = Transaction::debit(
                account.id,
                event.trip_id.clone(),
                applied,
                format!("Trip payment for tripId: {}", event.trip_id),
            );

            match self.store.commit(AccountWrite::new(updated), record) {
                Ok((stored, _)) => {
                    self.publisher
                        .payment_completed(&event.trip_id, event.user_id, applied);
                    tracing::info!(
                        trip_id = %event.trip_id,
                        %applied,
                        balance = %stored.balance,
                        "debit succeeded"
                    );
                    return Ok(());
                }
                // Stale snapshot: re-read and re-run every check against the
                // fresh state. Applying the old read could overdraw the
                // balance or overshoot the cap.
                Err(StoreError::VersionConflict) => {
                    account = self
                        .store
                        .find_by_user(event.user_id)?
                        .ok_or(BillingError::AccountNotFound(event.user_id))?;
                }
                // A concurrent delivery of the same trip committed first.
                Err(StoreError::DuplicateTrip(_)) => {
                    tracing::warn!(trip_id = %event.trip_id, "duplicate TRIP_PRICED event, skipping");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(BillingError::ConcurrencyConflict)
    }

    /// Runs steps 3-5 of the debit decision order against a snapshot:
    /// balance check, cap check, trim. Returns the amount to apply.
    fn evaluate_debit(&self, account: &Account, requested: Decimal) -> Result<Decimal, BillingError> {
        if account.balance < requested {
            return Err(BillingError::InsufficientBalance {
                available: account.balance,
                requested,
            });
        }

        let remaining = self.config.daily_cap - account.daily_spent;
        if remaining <= Decimal::ZERO {
            return Err(BillingError::DailyCapExceeded);
        }

        // Trim is strictly greater-than: a request equal to the headroom is
        // applied whole.
        if account.daily_spent + requested > self.config.daily_cap {
            tracing::info!(
                user_id = %account.user_id,
                %requested,
                %remaining,
                "trimming debit to daily-cap remainder"
            );
            Ok(remaining)
        } else {
            Ok(requested)
        }
    }

    /// Records a FAILED debit and publishes the failed outcome. A duplicate
    /// trip at append time means another delivery already recorded this trip.
    fn record_failure(
        &self,
        account_id: Option<AccountId>,
        event: &TripPricedEvent,
        reason: &str,
    ) -> Result<(), BillingError> {
        let record = Transaction::failed_debit(
            account_id,
            event.trip_id.clone(),
            event.final_amount,
            reason,
        );
        match self.store.append(record) {
            Ok(_) => {}
            Err(StoreError::DuplicateTrip(_)) => {
                tracing::warn!(trip_id = %event.trip_id, "duplicate TRIP_PRICED event, skipping");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        self.publisher
            .payment_failed(&event.trip_id, event.user_id, event.final_amount, reason);
        Ok(())
    }

    /// Zeroes `daily_spent` on every account. Best-effort per account: a row
    /// that keeps conflicting is skipped, logged, and picked up by the next
    /// sweep; one bad row never blocks the rest.
    pub fn reset_daily_spent(&self) -> Result<ResetOutcome, BillingError> {
        tracing::info!("resetting daily spend for all accounts");
        let mut outcome = ResetOutcome::default();

        for user_id in self.store.user_ids()? {
            match self.reset_one(user_id) {
                Ok(()) => outcome.reset += 1,
                Err(err) => {
                    tracing::warn!(%user_id, %err, "skipping account in daily reset");
                    outcome.skipped += 1;
                }
            }
        }

        tracing::info!(reset = outcome.reset, skipped = outcome.skipped, "daily reset complete");
        Ok(outcome)
    }

    fn reset_one(&self, user_id: UserId) -> Result<(), BillingError> {
        for _ in 0..MAX_WRITE_RETRIES {
            let Some(account) = self.store.find_by_user(user_id)? else {
                // Accounts are never deleted; a missing row mid-sweep would
                // be a storage fault, surfaced on the next read.
                return Ok(());
            };
            if account.daily_spent == Decimal::ZERO {
                return Ok(());
            }

            let mut updated = account.clone();
            updated.reset_daily_spent();
            match self.store.write(AccountWrite::new(updated)) {
                Ok(_) => return Ok(()),
                Err(StoreError::VersionConflict) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(BillingError::ConcurrencyConflict)
    }

    /// Read-only account lookup.
    pub fn get_account(&self, user_id: UserId) -> Result<Account, BillingError> {
        self.store
            .find_by_user(user_id)?
            .ok_or(BillingError::AccountNotFound(user_id))
    }

    /// Recorded outcome for a trip, if any. Backs the payment status lookup.
    pub fn find_payment(&self, trip_id: &TripId) -> Result<Option<Transaction>, BillingError> {
        Ok(self.store.find_by_trip(trip_id)?)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_account_uses_default_currency_for_blank_input() {
        let engine = Engine::in_memory();
        let account = engine.create_account(UserId(1), Some("   ")).unwrap();
        assert_eq!(account.currency, "XOF");

        let other = engine.create_account(UserId(2), Some("EUR")).unwrap();
        assert_eq!(other.currency, "EUR");
    }

    #[test]
    fn evaluate_debit_applies_full_amount_at_exact_headroom() {
        let engine = Engine::in_memory();
        let mut account = Account::new(UserId(1), "XOF");
        account.balance = dec!(100000);
        account.daily_spent = dec!(45000);

        // 5000 requested, exactly 5000 remaining: no trim.
        let applied = engine.evaluate_debit(&account, dec!(5000)).unwrap();
        assert_eq!(applied, dec!(5000));
    }

    #[test]
    fn evaluate_debit_checks_balance_against_requested_amount() {
        let engine = Engine::in_memory();
        let mut account = Account::new(UserId(1), "XOF");
        // Enough for the trimmed amount but not the requested one: the
        // balance check runs first, against the untrimmed request.
        account.balance = dec!(2000);
        account.daily_spent = dec!(49000);

        let result = engine.evaluate_debit(&account, dec!(5000));
        assert_eq!(
            result,
            Err(BillingError::InsufficientBalance {
                available: dec!(2000),
                requested: dec!(5000),
            })
        );
    }

    #[test]
    fn evaluate_debit_rejects_exhausted_cap_outright() {
        let engine = Engine::in_memory();
        let mut account = Account::new(UserId(1), "XOF");
        account.balance = dec!(100000);
        account.daily_spent = dec!(50000);

        // Not trimmed to a zero-amount success.
        let result = engine.evaluate_debit(&account, dec!(1));
        assert_eq!(result, Err(BillingError::DailyCapExceeded));
    }
}
