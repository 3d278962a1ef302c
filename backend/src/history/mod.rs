pub mod ledger;

pub use ledger::{HistoryLedger, JsonFileLedger, LedgerError};
