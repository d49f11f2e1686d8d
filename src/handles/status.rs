use std::fmt;

use log::{warn, Level};

/// Number of slots in an engine status vector.
pub const STATUS_VECTOR_LENGTH: usize = 20;

/// Terminates the entry stream of a status vector.
pub const ARG_END: i64 = 0;
/// Tag preceding an engine error code.
pub const ARG_GDS: i64 = 1;
/// Tag preceding a numeric argument to the previous error code.
pub const ARG_NUMBER: i64 = 4;
/// Tag preceding a warning code. Warnings do not fail the call.
pub const ARG_WARNING: i64 = 18;

/// Fixed-size buffer every engine call writes error and warning codes into.
///
/// The buffer holds a stream of `(tag, value)` pairs terminated by [`ARG_END`]. It must be cleared
/// before each engine call and interpreted immediately after, before the next call reuses it. The
/// crate enforces this by keeping the vector inside the per-database channel lock, so two calls on
/// the same connection can never share it concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVector([i64; STATUS_VECTOR_LENGTH]);

impl Default for StatusVector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusVector {
    pub fn new() -> Self {
        StatusVector([ARG_END; STATUS_VECTOR_LENGTH])
    }

    /// Reset all slots. Call before handing the vector to the engine.
    pub fn clear(&mut self) {
        self.0 = [ARG_END; STATUS_VECTOR_LENGTH];
    }

    /// `true` if the last call left at least one error code in the vector.
    pub fn has_errors(&self) -> bool {
        self.0[0] == ARG_GDS && self.0[1] != 0
    }

    /// Append an error code. Intended for [`crate::handles::EngineApi`] implementations reporting
    /// a failed call.
    pub fn push_error(&mut self, code: i64) {
        self.push_pair(ARG_GDS, code);
    }

    /// Append a warning code. The call still counts as successful.
    pub fn push_warning(&mut self, code: i64) {
        self.push_pair(ARG_WARNING, code);
    }

    fn push_pair(&mut self, tag: i64, value: i64) {
        let mut index = 0;
        while index + 1 < STATUS_VECTOR_LENGTH && self.0[index] != ARG_END {
            index += 2;
        }
        // Keep at least the terminating slot intact. Codes which do not fit are dropped, just
        // like a real vector truncates long error chains.
        if index + 2 < STATUS_VECTOR_LENGTH {
            self.0[index] = tag;
            self.0[index + 1] = value;
        }
    }

    /// Split the entry stream into error and warning codes. Numeric arguments are attributed to
    /// whatever code preceded them and not reported separately.
    pub fn interpret(&self) -> Interpretation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut index = 0;
        while index + 1 < STATUS_VECTOR_LENGTH {
            match self.0[index] {
                ARG_END => break,
                ARG_GDS => {
                    if self.0[index + 1] != 0 {
                        errors.push(self.0[index + 1]);
                    }
                }
                ARG_WARNING => warnings.push(self.0[index + 1]),
                // Numeric arguments qualify the preceding code. Unknown tags are skipped rather
                // than failing interpretation, the vector is advisory.
                _ => (),
            }
            index += 2;
        }
        Interpretation { errors, warnings }
    }
}

/// Result of [`StatusVector::interpret`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpretation {
    /// Error codes reported by the engine. Non-empty means the call failed.
    pub errors: Vec<i64>,
    /// Warning codes reported by the engine alongside a successful call.
    pub warnings: Vec<i64>,
}

/// Parsed error information of a failed engine call, extracted from the status vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    /// Engine error codes in the order they appeared in the vector. The first one is the primary
    /// error, the rest qualify it.
    pub codes: Vec<i64>,
}

impl StatusRecord {
    /// The primary error code, if any code was reported at all.
    pub fn primary(&self) -> Option<i64> {
        self.codes.first().copied()
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Engine error codes: ")?;
        let mut first = true;
        for code in &self.codes {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{code}")?;
            first = false;
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// Inspects the status vector of the last engine call and logs all warning codes. Mirrors what a
/// driver does with informational diagnostics after a successful call.
pub fn log_status_warnings(status: &StatusVector, function: &'static str) {
    if log::max_level() < Level::Warn {
        // Early return to save the work of interpreting the vector in case we would not log
        // anything.
        return;
    }

    for code in status.interpret().warnings {
        warn!("Engine call to '{function}' returned warning code {code}");
    }
}
