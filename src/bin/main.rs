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

use billing_ledger_rs::{
    AccountStore, Config, Engine, MemoryPublisher, MemoryStore, TripId, TripPricedEvent, UserId,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Billing Ledger - Replay billing operations from a CSV file
///
/// Reads account creations, top-ups, and priced-trip events from a CSV file,
/// runs them through the ledger engine, and writes the final account states
/// to stdout. Stands in for the broker consumer and the REST layer when
/// exercising the engine locally.
#[derive(Parser, Debug)]
#[command(name = "billing-ledger-rs")]
#[command(about = "A billing ledger engine that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: type,user,trip,amount
    /// Types: create, topup, trip_priced
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Daily spending cap per account
    #[arg(long, default_value = "50000")]
    daily_cap: Decimal,

    /// Currency for newly created accounts
    #[arg(long, default_value = "XOF")]
    currency: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let config = Config {
        daily_cap: args.daily_cap,
        default_currency: args.currency,
    };

    // Replay operations from CSV
    let (store, publisher) = match replay_operations(BufReader::new(file), config) {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    let payments = publisher.payments();
    tracing::info!(
        outcomes = payments.len(),
        "replay complete, writing account states"
    );

    // Write results to stdout
    if let Err(e) = write_accounts(&store, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, user, trip, amount`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    op_type: String,
    user: u64,
    trip: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
}

/// One replayable billing operation.
#[derive(Debug)]
enum Operation {
    Create { user_id: UserId },
    TopUp { user_id: UserId, amount: Decimal },
    TripPriced(TripPricedEvent),
}

impl CsvRecord {
    /// Converts a CSV record to an operation.
    ///
    /// Returns `None` for unknown operation types or missing required fields.
    fn into_operation(self) -> Option<Operation> {
        let user_id = UserId(self.user);

        match self.op_type.to_lowercase().as_str() {
            "create" => Some(Operation::Create { user_id }),
            "topup" => {
                let amount = self.amount?;
                Some(Operation::TopUp { user_id, amount })
            }
            "trip_priced" => {
                let trip = self.trip.filter(|t| !t.is_empty())?;
                let final_amount = self.amount?;
                Some(Operation::TripPriced(TripPricedEvent {
                    trip_id: TripId::new(trip),
                    user_id,
                    final_amount,
                }))
            }
            _ => None,
        }
    }
}

/// Replay operations from a CSV reader through a fresh engine.
///
/// Streaming parse, so arbitrarily large files work without loading them
/// into memory. Malformed rows are skipped; business failures (insufficient
/// balance, exhausted cap, unknown account) are logged by the engine and
/// never abort the run.
///
/// # CSV Format
///
/// Expected columns: `type, user, trip, amount`
/// - `type`: Operation type (create, topup, trip_priced)
/// - `user`: User ID (u64)
/// - `trip`: Trip ID (required for trip_priced)
/// - `amount`: Decimal amount (required for topup and trip_priced)
///
/// # Example
///
/// ```csv
/// type,user,trip,amount
/// create,1,,
/// topup,1,,10000.00
/// trip_priced,1,TRIP-001,500.00
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay_operations<R: Read>(
    reader: R,
    config: Config,
) -> Result<(Arc<MemoryStore>, Arc<MemoryPublisher>), csv::Error> {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(MemoryPublisher::new());
    let engine = Engine::new(store.clone(), publisher.clone(), config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed row");
                continue;
            }
        };

        let Some(op) = record.into_operation() else {
            tracing::debug!("skipping invalid operation record");
            continue;
        };

        // Engine-level failures are per-row outcomes, not replay faults.
        let outcome = match op {
            Operation::Create { user_id } => engine.create_account(user_id, None).map(|_| ()),
            Operation::TopUp { user_id, amount } => {
                engine.top_up(user_id, amount, None).map(|_| ())
            }
            Operation::TripPriced(event) => engine.process_debit(&event),
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "operation failed");
        }
    }

    Ok((store, publisher))
}

/// Write account states to a CSV writer, ordered by user id.
///
/// # CSV Format
///
/// Columns: `id, user_id, balance, daily_spent, currency`, money at scale 2.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_accounts<W: Write>(store: &MemoryStore, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let mut user_ids = store.user_ids().unwrap_or_default();
    user_ids.sort_unstable_by_key(|id| id.0);

    for user_id in user_ids {
        if let Ok(Some(account)) = store.find_by_user(user_id) {
            wtr.serialize(&account)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_ledger_rs::PaymentStatus;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn replay(csv: &str) -> (Arc<MemoryStore>, Arc<MemoryPublisher>) {
        replay_operations(Cursor::new(csv), Config::default()).unwrap()
    }

    #[test]
    fn parse_create_and_topup() {
        let csv = "type,user,trip,amount\n\
                   create,1,,\n\
                   topup,1,,100.00\n";
        let (store, _) = replay(csv);

        let account = store.find_by_user(UserId(1)).unwrap().unwrap();
        assert_eq!(account.balance, dec!(100.00));
        assert_eq!(account.currency, "XOF");
    }

    #[test]
    fn parse_trip_priced_debit() {
        let csv = "type,user,trip,amount\n\
                   create,1,,\n\
                   topup,1,,10000.00\n\
                   trip_priced,1,TRIP-001,500.00\n";
        let (store, publisher) = replay(csv);

        let account = store.find_by_user(UserId(1)).unwrap().unwrap();
        assert_eq!(account.balance, dec!(9500.00));
        assert_eq!(account.daily_spent, dec!(500.00));

        let payments = publisher.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Completed);
        assert_eq!(payments[0].amount, dec!(500.00));
    }

    #[test]
    fn duplicate_trip_rows_bill_once() {
        let csv = "type,user,trip,amount\n\
                   create,1,,\n\
                   topup,1,,1000.00\n\
                   trip_priced,1,TRIP-001,100.00\n\
                   trip_priced,1,TRIP-001,100.00\n";
        let (store, publisher) = replay(csv);

        let account = store.find_by_user(UserId(1)).unwrap().unwrap();
        assert_eq!(account.balance, dec!(900.00));
        assert_eq!(publisher.payments().len(), 1);
    }

    #[test]
    fn parse_with_whitespace() {
        let csv = "type,user,trip,amount\n topup ,,,\n create , 1 , , \n";
        let (store, _) = replay(csv);

        // Only the create row is valid (topup row has no user/amount).
        assert_eq!(store.account_count(), 1);
        assert!(store.find_by_user(UserId(1)).unwrap().is_some());
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "type,user,trip,amount\n\
                   create,1,,\n\
                   nonsense,not-a-user,,abc\n\
                   create,2,,\n";
        let (store, _) = replay(csv);

        assert_eq!(store.account_count(), 2);
    }

    #[test]
    fn business_failures_do_not_abort_replay() {
        let csv = "type,user,trip,amount\n\
                   create,1,,\n\
                   trip_priced,1,TRIP-001,500.00\n\
                   topup,1,,100.00\n";
        let (store, publisher) = replay(csv);

        // The debit failed on insufficient balance, the later top-up landed.
        let account = store.find_by_user(UserId(1)).unwrap().unwrap();
        assert_eq!(account.balance, dec!(100.00));

        let payments = publisher.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
    }

    #[test]
    fn write_accounts_to_csv() {
        let csv = "type,user,trip,amount\n\
                   create,2,,\n\
                   create,1,,\n\
                   topup,1,,100.50\n";
        let (store, _) = replay(csv);

        let mut output = Vec::new();
        write_accounts(&store, &mut output).unwrap();

        let output_str = String::from_utf8(output).unwrap();
        let mut lines = output_str.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,user_id,balance,daily_spent,currency"
        );
        // Ordered by user id. Whole numbers serialize without trailing
        // zeros; amounts with fractional digits round to scale 2.
        assert!(lines.next().unwrap().contains(",1,100.50,0,XOF"));
        assert!(lines.next().unwrap().contains(",2,0,0,XOF"));
    }
}
