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

//! Account records.
//!
//! An [`Account`] is a plain cloneable value: the engine reads a snapshot,
//! mutates it, and writes it back through the store's compare-and-swap
//! contract. The `version` token is the serialization point for concurrent
//! writers; a stale snapshot is rejected at write time, never silently
//! applied.
//!
//! # Example
//!
//! ```
//! use billing_ledger_rs::{Account, UserId};
//! use rust_decimal_macros::dec;
//!
//! let account = Account::new(UserId(1), "XOF");
//! assert_eq!(account.balance, dec!(0));
//! assert_eq!(account.version, 0);
//! ```

use crate::base::{AccountId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Per-user monetary balance record with daily spend tracking.
///
/// # Invariants
///
/// - `balance` is never negative.
/// - A single debit never pushes `daily_spent` past the configured cap.
/// - `version` only ever increases, bumped by the store on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// System-assigned identifier, immutable once assigned.
    pub id: AccountId,
    /// External owner; unique per store.
    pub user_id: UserId,
    /// Available funds. Exact decimal, never binary floating point.
    pub balance: Decimal,
    /// Cumulative debits since the last daily reset.
    pub daily_spent: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Timestamp of the last mutation, stamped by the store.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by the store on every write.
    pub version: u64,
}

impl Account {
    /// Monetary values are persisted and reported at scale 2.
    const MONEY_SCALE: u32 = 2;

    /// Creates a zero-balance account for `user_id`.
    pub fn new(user_id: UserId, currency: impl Into<String>) -> Self {
        Self {
            id: AccountId::generate(),
            user_id,
            balance: Decimal::ZERO,
            daily_spent: Decimal::ZERO,
            currency: currency.into(),
            updated_at: Utc::now(),
            version: 0,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            self.daily_spent >= Decimal::ZERO,
            "Invariant violated: daily_spent went negative: {}",
            self.daily_spent
        );
    }

    /// Increases the balance. Caller validates the amount is positive.
    pub(crate) fn credit(&mut self, amount: Decimal) {
        self.balance += amount;
        self.assert_invariants();
    }

    /// Decreases the balance and adds to the daily spend in one step.
    /// Caller has already verified funds and cap headroom.
    pub(crate) fn debit(&mut self, amount: Decimal) {
        self.balance -= amount;
        self.daily_spent += amount;
        self.assert_invariants();
    }

    /// Zeroes the daily spend counter (daily reset sweep).
    pub(crate) fn reset_daily_spent(&mut self) {
        self.daily_spent = Decimal::ZERO;
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Account", 5)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("user_id", &self.user_id)?;
        state.serialize_field("balance", &self.balance.round_dp(Account::MONEY_SCALE))?;
        state.serialize_field(
            "daily_spent",
            &self.daily_spent.round_dp(Account::MONEY_SCALE),
        )?;
        state.serialize_field("currency", &self.currency)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_account_starts_at_zero() {
        let account = Account::new(UserId(7), "XOF");
        assert_eq!(account.user_id, UserId(7));
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.daily_spent, Decimal::ZERO);
        assert_eq!(account.currency, "XOF");
        assert_eq!(account.version, 0);
    }

    #[test]
    fn credit_increases_balance_only() {
        let mut account = Account::new(UserId(1), "XOF");
        account.credit(dec!(100.00));
        assert_eq!(account.balance, dec!(100.00));
        assert_eq!(account.daily_spent, Decimal::ZERO);
    }

    #[test]
    fn debit_moves_balance_into_daily_spent() {
        let mut account = Account::new(UserId(1), "XOF");
        account.credit(dec!(100.00));
        account.debit(dec!(30.00));
        assert_eq!(account.balance, dec!(70.00));
        assert_eq!(account.daily_spent, dec!(30.00));
    }

    #[test]
    fn reset_clears_daily_spent_but_not_balance() {
        let mut account = Account::new(UserId(1), "XOF");
        account.credit(dec!(100.00));
        account.debit(dec!(40.00));
        account.reset_daily_spent();
        assert_eq!(account.daily_spent, Decimal::ZERO);
        assert_eq!(account.balance, dec!(60.00));
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_rounds_money_to_two_decimal_places() {
        let mut account = Account::new(UserId(3), "EUR");
        // 123.456 rounds to 123.46, 0.004 rounds to 0.00
        account.balance = dec!(123.456);
        account.daily_spent = dec!(0.004);

        let json = serde_json::to_string(&account).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["balance"].as_str().unwrap(), "123.46");
        assert_eq!(parsed["daily_spent"].as_str().unwrap(), "0.00");
        assert_eq!(parsed["currency"], "EUR");
        assert_eq!(parsed["user_id"], 3);
    }

    #[test]
    fn serializer_omits_version_and_timestamp() {
        let account = Account::new(UserId(1), "XOF");
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&account).unwrap()).unwrap();

        assert!(parsed.get("version").is_none());
        assert!(parsed.get("updated_at").is_none());
    }

    #[test]
    fn serializer_uses_bankers_rounding() {
        let mut account = Account::new(UserId(1), "XOF");
        // Decimal rounds half to even: 0.125 -> 0.12, 0.135 -> 0.14
        account.balance = dec!(0.125);
        account.daily_spent = dec!(0.135);

        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&account).unwrap()).unwrap();

        assert_eq!(parsed["balance"].as_str().unwrap(), "0.12");
        assert_eq!(parsed["daily_spent"].as_str().unwrap(), "0.14");
    }
}
