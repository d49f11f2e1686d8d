//! In-process representation of a row or parameter shape, mirrored to and from the engine's
//! binary descriptor layout by [`crate::handles::sqlda`].

/// SQL type code of a fixed-length character slot.
pub const SQL_TEXT: i16 = 452;
/// SQL type code of a variable-length character slot.
pub const SQL_VARYING: i16 = 448;
/// SQL type code of a 16 bit integer slot.
pub const SQL_SHORT: i16 = 500;
/// SQL type code of a 32 bit integer slot.
pub const SQL_LONG: i16 = 496;
/// SQL type code of a 32 bit floating point slot.
pub const SQL_FLOAT: i16 = 482;
/// SQL type code of a 64 bit floating point slot.
pub const SQL_DOUBLE: i16 = 480;
/// SQL type code of a timestamp slot.
pub const SQL_TIMESTAMP: i16 = 510;
/// SQL type code of a BLOB id slot.
pub const SQL_BLOB: i16 = 520;
/// SQL type code of an ARRAY id slot.
pub const SQL_ARRAY: i16 = 540;
/// SQL type code of a 64 bit integer slot.
pub const SQL_INT64: i16 = 580;

/// Engine-side identifier of an opened array. Per-column session state which cannot be derived
/// again from raw fetch data once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayHandle(pub u64);

/// One column or parameter entry within a [`Descriptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    /// SQL type code, see the `SQL_*` constants of this module.
    pub sql_type: i16,
    /// Subtype qualifying `sql_type`, e.g. the text subtype of a BLOB.
    pub subtype: i16,
    /// Decimal scale for exact numeric slots.
    pub scale: i16,
    /// Size of the value region of this slot in bytes.
    pub length: u16,
    /// `true` if the column or parameter admits NULL.
    pub nullable: bool,
    /// Character set id of text slots. Transcoding is not performed at this layer.
    pub charset: u16,
    /// Current value, exactly [`Self::length`] bytes once described.
    pub data: Vec<u8>,
    /// `true` if the current value is NULL. The bytes in `data` are meaningless then.
    pub null: bool,
    /// Resolved array handle, only ever present on [`SQL_ARRAY`] typed slots.
    pub array_handle: Option<ArrayHandle>,
}

impl Slot {
    /// `true` if the slot carries an ARRAY id.
    pub fn is_array(&self) -> bool {
        self.sql_type == SQL_ARRAY
    }

    /// Forget the current value and null indicator, keep the described shape.
    pub fn reset_value(&mut self) {
        self.data.clear();
        self.data.resize(self.length as usize, 0);
        self.null = false;
    }
}

/// Ordered sequence of typed slots describing a row or parameter shape.
///
/// `count` is the number of slots this side allocated, `actual_count` is what the engine reported
/// during the last describe pass. The two can legitimately differ after the first negotiation
/// pass, never after the second. Once they are equal the descriptor is fully negotiated and stable
/// for the remainder of the statement's current prepared form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    version: u16,
    actual_count: i16,
    slots: Vec<Slot>,
}

impl Descriptor {
    /// A descriptor with `count` default slots and an actual count of zero.
    pub fn new(count: i16) -> Self {
        Descriptor {
            version: crate::handles::SQLDA_VERSION1,
            actual_count: 0,
            slots: vec![Slot::default(); count.max(0) as usize],
        }
    }

    pub(crate) fn from_parts(version: u16, actual_count: i16, slots: Vec<Slot>) -> Self {
        Descriptor {
            version,
            actual_count,
            slots,
        }
    }

    /// Layout version, carried through encode and decode.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Number of slots allocated on this side.
    pub fn count(&self) -> i16 {
        self.slots.len() as i16
    }

    /// Number of slots the engine reported during the last describe pass.
    pub fn actual_count(&self) -> i16 {
        self.actual_count
    }

    /// Record the slot count reported by the engine. Intended for
    /// [`crate::handles::EngineApi`] implementations writing response blocks.
    pub fn set_actual_count(&mut self, actual_count: i16) {
        self.actual_count = actual_count;
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [Slot] {
        &mut self.slots
    }

    /// Forget all current values and null indicators, keep the described shape.
    pub fn reset_values(&mut self) {
        for slot in &mut self.slots {
            slot.reset_value();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_descriptor_has_default_slots() {
        let descriptor = Descriptor::new(3);
        assert_eq!(descriptor.count(), 3);
        assert_eq!(descriptor.actual_count(), 0);
        assert!(descriptor.slots().iter().all(|slot| slot.data.is_empty()));
    }

    #[test]
    fn negative_count_is_clamped_to_empty() {
        let descriptor = Descriptor::new(-1);
        assert_eq!(descriptor.count(), 0);
    }

    #[test]
    fn reset_values_zeroes_data_and_null_indicators() {
        let mut descriptor = Descriptor::new(1);
        {
            let slot = &mut descriptor.slots_mut()[0];
            slot.length = 4;
            slot.data = vec![1, 2, 3, 4];
            slot.null = true;
        }
        descriptor.reset_values();
        let slot = &descriptor.slots()[0];
        assert_eq!(slot.data, [0, 0, 0, 0]);
        assert!(!slot.null);
    }

    #[test]
    fn only_array_typed_slots_are_arrays() {
        let mut slot = Slot {
            sql_type: SQL_ARRAY,
            ..Slot::default()
        };
        assert!(slot.is_array());
        slot.sql_type = SQL_BLOB;
        assert!(!slot.is_array());
    }
}
