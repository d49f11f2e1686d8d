//! # ISC DSQL statement layer
//!
//! This library implements the client side of the dynamic SQL statement lifecycle against an
//! InterBase-style database engine which is reachable only through a low-level, handle-based call
//! boundary: allocate, prepare, describe, execute, fetch, free. The engine does not enforce the
//! statement state machine in-process and describes row and parameter shapes through a
//! self-describing binary descriptor block whose layout is negotiated in two passes, so both
//! concerns live on this side of the wire.
//!
//! The physical transport to the engine is not part of this crate. It is consumed through the
//! [`handles::EngineApi`] trait; every call is synchronous and blocks the calling thread until
//! the engine replies. Character set transcoding and BLOB or ARRAY payload streaming are
//! likewise external collaborators.
//!
//! ```no_run
//! use std::sync::Arc;
//! use isc_api::{handles::{DbHandle, EngineApi, TrHandle}, Database, Statement, Transaction};
//!
//! fn count_rows(engine: Box<dyn EngineApi>) -> Result<(), isc_api::Error> {
//!     let db = Arc::new(Database::new(engine, DbHandle(1), 3, 0));
//!     let transaction = Arc::new(Transaction::new(TrHandle(1)));
//!     let mut statement = Statement::new(db, Some(transaction));
//!     statement.prepare("SELECT id, name FROM employee")?;
//!     statement.execute()?;
//!     while let Some(row) = statement.fetch()? {
//!         println!("{} columns", row.len());
//!     }
//!     Ok(())
//! }
//! ```

mod database;
mod descriptor;
mod error;
mod statement;
mod transaction;
mod value;

pub mod handles;

pub use self::{
    database::Database,
    descriptor::{
        ArrayHandle, Descriptor, Slot, SQL_ARRAY, SQL_BLOB, SQL_DOUBLE, SQL_FLOAT, SQL_INT64,
        SQL_LONG, SQL_SHORT, SQL_TEXT, SQL_TIMESTAMP, SQL_VARYING,
    },
    error::Error,
    statement::{State, Statement, StatementKind},
    transaction::{Subscription, Transaction},
    value::Value,
};
