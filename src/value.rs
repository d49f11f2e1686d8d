use std::sync::{Mutex, Weak};

use crate::{
    descriptor::{ArrayHandle, Slot},
    statement::Core,
};

/// Projection of one descriptor slot as produced by a fetch or a stored-procedure execution.
///
/// A value snapshots the slot it was created from; the statement's own slot buffer is overwritten
/// by the next fetch. The value additionally keeps a weak back-reference to the owning statement,
/// because BLOB and ARRAY slots carry only an engine-side id inline and resolving their payload
/// requires a follow-up call through the statement and its transaction. The back-reference never
/// extends the statement's lifetime: once the statement is dropped, deferred resolution is simply
/// no longer possible.
#[derive(Debug, Clone)]
pub struct Value {
    slot: Slot,
    owner: Weak<Mutex<Core>>,
}

impl Value {
    pub(crate) fn new(slot: Slot, owner: Weak<Mutex<Core>>) -> Self {
        Value { slot, owner }
    }

    /// SQL type code of the projected slot.
    pub fn sql_type(&self) -> i16 {
        self.slot.sql_type
    }

    /// Subtype of the projected slot.
    pub fn subtype(&self) -> i16 {
        self.slot.subtype
    }

    /// Decimal scale of the projected slot.
    pub fn scale(&self) -> i16 {
        self.slot.scale
    }

    /// Character set id of the projected slot.
    pub fn charset(&self) -> u16 {
        self.slot.charset
    }

    /// `true` if the slot held NULL for this row.
    pub fn is_null(&self) -> bool {
        self.slot.null
    }

    /// Raw value bytes. Meaningless if [`Self::is_null`] is true. For BLOB and ARRAY slots this
    /// is the engine-side id, not the payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.slot.data
    }

    /// Resolved array handle of an ARRAY slot, if the statement already resolved one for this
    /// column.
    pub fn array_handle(&self) -> Option<ArrayHandle> {
        self.slot.array_handle
    }

    /// `true` while the owning statement is still alive, i.e. while deferred BLOB or ARRAY
    /// resolution through it remains possible.
    pub fn owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ArrayHandle, SQL_ARRAY, SQL_VARYING};

    #[test]
    fn value_snapshots_the_slot() {
        let slot = Slot {
            sql_type: SQL_VARYING,
            length: 3,
            data: vec![b'a', b'b', b'c'],
            ..Slot::default()
        };
        let value = Value::new(slot, Weak::new());
        assert_eq!(value.sql_type(), SQL_VARYING);
        assert_eq!(value.as_bytes(), b"abc");
        assert!(!value.is_null());
    }

    #[test]
    fn orphaned_values_report_a_dead_owner() {
        let slot = Slot {
            sql_type: SQL_ARRAY,
            array_handle: Some(ArrayHandle(3)),
            ..Slot::default()
        };
        let value = Value::new(slot, Weak::new());
        assert!(!value.owner_alive());
        assert_eq!(value.array_handle(), Some(ArrayHandle(3)));
    }
}
