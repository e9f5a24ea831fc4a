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

//! Inbound and outbound event types, plus the publisher seam.
//!
//! Outbound delivery is fire-and-forget: the engine's correctness never
//! depends on downstream receipt, so [`EventPublisher`] methods return
//! nothing. Broker-level retry and dead-lettering belong to the consumer
//! adapter, not to this crate.

use crate::base::{TripId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inbound priced-trip event, delivered at-least-once by the broker adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripPricedEvent {
    pub trip_id: TripId,
    pub user_id: UserId,
    pub final_amount: Decimal,
}

/// Outcome of a trip payment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Completed,
    Failed,
}

/// Outbound payment outcome notification.
///
/// `amount` carries the applied amount for completed payments (which may be
/// trimmed below the request) and the originally requested amount for failed
/// ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEvent {
    pub trip_id: TripId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub reason: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Outbound notification that an account was topped up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountCreditedEvent {
    pub user_id: UserId,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Best-effort outcome notification sink.
pub trait EventPublisher: Send + Sync {
    fn payment_completed(&self, trip_id: &TripId, user_id: UserId, amount: Decimal);

    fn payment_failed(&self, trip_id: &TripId, user_id: UserId, amount: Decimal, reason: &str);

    fn account_credited(&self, user_id: UserId, amount: Decimal);
}

/// Publisher that drops every event.
#[derive(Debug, Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn payment_completed(&self, _trip_id: &TripId, _user_id: UserId, _amount: Decimal) {}

    fn payment_failed(&self, _trip_id: &TripId, _user_id: UserId, _amount: Decimal, _reason: &str) {
    }

    fn account_credited(&self, _user_id: UserId, _amount: Decimal) {}
}

/// Publisher that records every event in memory, for tests and the replay
/// driver.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    payments: Mutex<Vec<PaymentEvent>>,
    credits: Mutex<Vec<AccountCreditedEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the payment outcomes published so far.
    pub fn payments(&self) -> Vec<PaymentEvent> {
        self.payments.lock().clone()
    }

    /// Snapshot of the account-credited events published so far.
    pub fn credits(&self) -> Vec<AccountCreditedEvent> {
        self.credits.lock().clone()
    }
}

impl EventPublisher for MemoryPublisher {
    fn payment_completed(&self, trip_id: &TripId, user_id: UserId, amount: Decimal) {
        tracing::info!(%trip_id, %user_id, %amount, "publishing PAYMENT_COMPLETED");
        self.payments.lock().push(PaymentEvent {
            trip_id: trip_id.clone(),
            user_id,
            amount,
            status: PaymentStatus::Completed,
            reason: None,
            processed_at: Utc::now(),
        });
    }

    fn payment_failed(&self, trip_id: &TripId, user_id: UserId, amount: Decimal, reason: &str) {
        tracing::warn!(%trip_id, %user_id, %amount, reason, "publishing PAYMENT_FAILED");
        self.payments.lock().push(PaymentEvent {
            trip_id: trip_id.clone(),
            user_id,
            amount,
            status: PaymentStatus::Failed,
            reason: Some(reason.to_string()),
            processed_at: Utc::now(),
        });
    }

    fn account_credited(&self, user_id: UserId, amount: Decimal) {
        tracing::info!(%user_id, %amount, "publishing ACCOUNT_CREDITED");
        self.credits.lock().push(AccountCreditedEvent {
            user_id,
            amount,
            timestamp: Utc::now(),
        });
    }
}
