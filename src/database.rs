use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    error::Error,
    handles::{log_status_warnings, DbHandle, EngineApi, StatusRecord, StatusVector},
};

/// An attached database: the handle and channel provider shared by all statements on the same
/// connection.
///
/// The engine does not support interleaved calls on the same connection, so access to the engine
/// goes through an exclusive [`Channel`] lock held for the duration of each call. The status
/// vector lives inside the channel as well, which makes it impossible for two concurrently
/// executing calls to share the scratch buffer.
pub struct Database {
    handle: DbHandle,
    dialect: u16,
    charset_id: u16,
    channel: Mutex<Channel>,
}

/// Exclusive access to the engine plus the per-call status scratch buffer.
pub(crate) struct Channel {
    pub api: Box<dyn EngineApi>,
    pub status: StatusVector,
}

impl Database {
    /// Wrap an attachment handle together with the engine it was issued by.
    ///
    /// `dialect` is the SQL dialect passed to every prepare call. `charset_id` is the character
    /// set of the connection; it is recorded on described text slots but no transcoding happens
    /// at this layer.
    pub fn new(api: Box<dyn EngineApi>, handle: DbHandle, dialect: u16, charset_id: u16) -> Self {
        Database {
            handle,
            dialect,
            charset_id,
            channel: Mutex::new(Channel {
                api,
                status: StatusVector::new(),
            }),
        }
    }

    pub fn handle(&self) -> DbHandle {
        self.handle
    }

    pub fn dialect(&self) -> u16 {
        self.dialect
    }

    pub fn charset_id(&self) -> u16 {
        self.charset_id
    }

    /// Acquire the exclusive engine channel. Poisoning is ignored: the engine state is owned by
    /// the server process, a panicked statement operation does not invalidate it.
    pub(crate) fn channel(&self) -> MutexGuard<'_, Channel> {
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Interpret the status vector of the engine call named `function`.
    ///
    /// Warnings are logged and do not fail the call. Error codes are parsed into a typed
    /// [`Error::Engine`] value. Must be invoked after every engine call before any of its output
    /// is used.
    pub fn check(&self, status: &StatusVector, function: &'static str) -> Result<(), Error> {
        log_status_warnings(status, function);
        if status.has_errors() {
            let record = StatusRecord {
                codes: status.interpret().errors,
            };
            Err(Error::Engine { record, function })
        } else {
            Ok(())
        }
    }
}
