//! Ledger store for the beverage POS backend.
//!
//! Holds the relational state: inventory items, batches, stock movements,
//! shipments, orders and their lines. Two backends share one transactional
//! interface:
//! - [`PostgresLedger`] — sqlx over PostgreSQL, row locks via
//!   `SELECT ... FOR UPDATE`
//! - [`InMemoryLedger`] — behavioural twin for tests; a single mutex plays
//!   the role of the row locks and uncommitted transactions roll back

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{LedgerError, Result};
pub use memory::{InMemoryLedger, InMemoryTx};
pub use postgres::{PostgresLedger, PostgresTx};
pub use store::{BatchDraw, Ledger, LedgerTx};
