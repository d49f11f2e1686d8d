use thiserror::Error as ThisError;

use crate::{handles::StatusRecord, statement::State};

/// Error type used to indicate that a statement operation failed.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The engine left error codes in the status vector of a call. The statement's own state is
    /// left as whatever partial progress occurred before the failure; callers must not assume
    /// atomicity of multi-step sequences like prepare's two-phase describe.
    #[error("The engine reported an error calling '{function}'. {record}")]
    Engine {
        /// Parsed contents of the status vector.
        record: StatusRecord,
        /// Engine call which produced the error codes.
        function: &'static str,
    },
    /// An engine call signalled failure through its return value but left the status vector
    /// empty. This should never happen with a well-behaved engine, yet better to be on the safe
    /// side than to report success.
    #[error(
        "The engine call to '{function}' failed without leaving any codes in the status vector."
    )]
    NoStatusInfo {
        /// Engine call which failed silently.
        function: &'static str,
    },
    /// An operation was invoked in a statement state which forbids it. This is a programming
    /// error in the caller, never retried and never reaching the engine.
    #[error("Operation '{operation}' is illegal on a statement in state {state:?}.")]
    InvalidState {
        operation: &'static str,
        /// Statement state at the time of the call.
        state: State,
    },
    /// An operation requiring an engine round trip was invoked while no transaction is bound to
    /// the statement.
    #[error("Operation '{operation}' requires a transaction bound to the statement.")]
    NoTransaction { operation: &'static str },
    /// A descriptor block returned by the engine could not be decoded.
    #[error("The engine returned a malformed descriptor block: {reason}.")]
    MalformedDescriptor { reason: &'static str },
    /// A statement-info response buffer could not be parsed, or did not contain the requested
    /// item.
    #[error("The engine returned a malformed or incomplete info buffer.")]
    MalformedInfoBuffer,
}
