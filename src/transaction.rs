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

//! Ledger records.
//!
//! Every credit or debit attempt leaves exactly one append-only
//! [`Transaction`] in the ledger: one per top-up and one per distinct trip id
//! outcome, success or failure. Records are never updated or deleted.

use crate::base::{AccountId, TransactionId, TripId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a ledger record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Credit,
    Debit,
}

/// Outcome of a ledger record.
///
/// `Pending` is reserved for flows that stage a record before settlement;
/// current operations only ever write `Success` or `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Success,
    Failed,
    Pending,
}

/// Append-only record of one credit or debit attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// System-assigned identifier.
    pub id: TransactionId,
    /// Owning account. `None` only for the degenerate failure record written
    /// when no account exists for the debited user.
    pub account_id: Option<AccountId>,
    /// External trip id; unique across the ledger when present.
    pub trip_id: Option<TripId>,
    /// Positive amount. The applied magnitude for successful debits (post
    /// trim), the originally requested magnitude for failure records.
    pub amount: Decimal,
    /// Credit or debit.
    pub kind: TransactionType,
    /// Success or failure outcome.
    pub status: TransactionStatus,
    /// Free-text audit note.
    pub description: String,
    /// Set at append time, immutable afterwards.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    fn record(
        account_id: Option<AccountId>,
        trip_id: Option<TripId>,
        amount: Decimal,
        kind: TransactionType,
        status: TransactionStatus,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            trip_id,
            amount,
            kind,
            status,
            description: description.into(),
            created_at: Utc::now(),
        }
    }

    /// Successful top-up record.
    pub fn credit(account_id: AccountId, amount: Decimal, description: impl Into<String>) -> Self {
        Self::record(
            Some(account_id),
            None,
            amount,
            TransactionType::Credit,
            TransactionStatus::Success,
            description,
        )
    }

    /// Successful trip debit record carrying the applied amount.
    pub fn debit(
        account_id: AccountId,
        trip_id: TripId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self::record(
            Some(account_id),
            Some(trip_id),
            amount,
            TransactionType::Debit,
            TransactionStatus::Success,
            description,
        )
    }

    /// Failed trip debit record carrying the originally requested amount.
    /// `account_id` is absent when no account exists for the user.
    pub fn failed_debit(
        account_id: Option<AccountId>,
        trip_id: TripId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self::record(
            account_id,
            Some(trip_id),
            amount,
            TransactionType::Debit,
            TransactionStatus::Failed,
            description,
        )
    }
}
