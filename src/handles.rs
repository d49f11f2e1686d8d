//! Low-level material of the engine call boundary: the status channel, the call trait, and the
//! codecs for the descriptor and info wire shapes.
//!
//! Two decisions are already baked into this module:
//!
//! * Warnings found in the status vector after a successful call are logged with `log`.
//! * Descriptor blocks and info buffers are little-endian.

mod engine;
pub mod info;
pub mod sqlda;
mod status;

pub use self::{
    engine::{
        DbHandle, EngineApi, FreeStatementOption, StmtHandle, TrHandle, FETCH_NO_MORE_ROWS,
        SQLDA_VERSION1,
    },
    status::{
        log_status_warnings, Interpretation, StatusRecord, StatusVector, STATUS_VECTOR_LENGTH,
    },
};
