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

//! Error types for billing operations and storage contracts.
//!
//! Business-rule failures on the debit path ([`BillingError::InsufficientBalance`],
//! [`BillingError::DailyCapExceeded`], account-not-found) are recovered by the
//! engine into FAILED ledger records plus failed-outcome events; their
//! `Display` strings double as the failure descriptions written to the ledger.
//! Infrastructure failures propagate so the caller's retry or dead-letter
//! machinery can engage.

use crate::base::{TripId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Billing engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// No account exists for the given user.
    #[error("Account not found for userId: {0}")]
    AccountNotFound(UserId),

    /// Top-up amount is zero or negative.
    #[error("Top-up amount must be positive")]
    InvalidAmount,

    /// Requested debit exceeds the available balance.
    #[error("Insufficient balance: available={available}, requested={requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// No spending headroom left under the daily cap.
    #[error("Daily spending cap exceeded")]
    DailyCapExceeded,

    /// Optimistic-concurrency retries exhausted.
    #[error("Concurrent update conflict, retries exhausted")]
    ConcurrencyConflict,

    /// Storage fault, fatal to the current operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BillingError {
    /// Whether this is a deterministic business outcome (recorded as a FAILED
    /// transaction) rather than a transient infrastructure fault.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_) | Self::InsufficientBalance { .. } | Self::DailyCapExceeded
        )
    }
}

/// Storage contract errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An account already exists for this user.
    #[error("account already exists for userId {0}")]
    DuplicateUser(UserId),

    /// A ledger record already exists for this trip.
    #[error("transaction already recorded for tripId {0}")]
    DuplicateTrip(TripId),

    /// The stored account version differs from the expected one.
    #[error("stale account version")]
    VersionConflict,

    /// Backend unavailable or failed; reserved for durable implementations.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
