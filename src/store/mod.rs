//! Persistence for the pipeline's two durable records: the mail sync
//! cursor and the submitted-delivery ledger.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{CURSOR_KEY, Store, SubmittedDelivery};
