pub mod connection;
pub mod fixtures;
pub mod ledger;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoPracticeSeed, SeedResult, VerificationResult};
pub use ledger::{BookingLedger, BookingOutcome, BookingRejection, CancelOutcome, LedgerError};
