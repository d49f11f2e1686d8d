//! Symmetric encoder and decoder for the engine's native descriptor block.
//!
//! The block is self describing: a little-endian header carrying the layout version and the
//! requested and actual slot counts, followed by one fixed-size record per slot, followed by a
//! data region the records point into via offsets. Encoding borrows from a [`Descriptor`] to
//! produce a transient wire buffer scoped to a single engine call (or to one statement execution
//! in case of the retained fetch buffer). Decoding consumes a wire buffer and produces a fresh
//! [`Descriptor`].

use crate::{
    descriptor::{Descriptor, Slot},
    error::Error,
    handles::engine::SQLDA_VERSION1,
};

/// Size of the block header: version, count, actual count.
const HEADER_LEN: usize = 6;
/// Size of one fixed slot record.
const RECORD_LEN: usize = 20;

const FLAG_NULLABLE: u16 = 0x0001;

/// Null indicator value of a NULL slot in the data region.
const INDICATOR_NULL: i16 = -1;

/// Encode a descriptor into the engine's native block layout.
///
/// Slot values are padded or truncated to the described slot length, so a probe descriptor with
/// undescribed (zero length) slots encodes to a header and empty records only.
pub fn encode(descriptor: &Descriptor) -> Vec<u8> {
    let count = descriptor.count() as usize;
    let data_len: usize = descriptor
        .slots()
        .iter()
        .map(|slot| 2 + slot.length as usize)
        .sum();
    let mut block = Vec::with_capacity(HEADER_LEN + count * RECORD_LEN + data_len);

    block.extend_from_slice(&descriptor.version().to_le_bytes());
    block.extend_from_slice(&descriptor.count().to_le_bytes());
    block.extend_from_slice(&descriptor.actual_count().to_le_bytes());

    // First pass: slot records with the offsets their values will land on.
    let mut cursor = (HEADER_LEN + count * RECORD_LEN) as u32;
    for slot in descriptor.slots() {
        block.extend_from_slice(&slot.sql_type.to_le_bytes());
        block.extend_from_slice(&slot.subtype.to_le_bytes());
        block.extend_from_slice(&slot.scale.to_le_bytes());
        block.extend_from_slice(&slot.length.to_le_bytes());
        let flags = if slot.nullable { FLAG_NULLABLE } else { 0 };
        block.extend_from_slice(&flags.to_le_bytes());
        block.extend_from_slice(&slot.charset.to_le_bytes());
        block.extend_from_slice(&cursor.to_le_bytes());
        cursor += 2;
        block.extend_from_slice(&cursor.to_le_bytes());
        cursor += slot.length as u32;
    }

    // Second pass: data region with null indicators and values.
    for slot in descriptor.slots() {
        let indicator = if slot.null { INDICATOR_NULL } else { 0 };
        block.extend_from_slice(&indicator.to_le_bytes());
        let length = slot.length as usize;
        if slot.data.len() >= length {
            block.extend_from_slice(&slot.data[..length]);
        } else {
            block.extend_from_slice(&slot.data);
            block.resize(block.len() + length - slot.data.len(), 0);
        }
    }

    block
}

/// Decode an engine-written block into a fresh descriptor.
///
/// Array handles are never part of the wire data. Carrying resolved handles forward across a
/// re-fetch is the responsibility of the statement, not the codec.
pub fn decode(block: &[u8]) -> Result<Descriptor, Error> {
    if block.len() < HEADER_LEN {
        return Err(Error::MalformedDescriptor {
            reason: "block shorter than its header",
        });
    }
    let version = read_u16(block, 0)?;
    if version != SQLDA_VERSION1 {
        return Err(Error::MalformedDescriptor {
            reason: "unsupported layout version",
        });
    }
    let count = read_i16(block, 2)?;
    let actual_count = read_i16(block, 4)?;
    if count < 0 {
        return Err(Error::MalformedDescriptor {
            reason: "negative slot count",
        });
    }

    let mut slots = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let record = HEADER_LEN + index * RECORD_LEN;
        let sql_type = read_i16(block, record)?;
        let subtype = read_i16(block, record + 2)?;
        let scale = read_i16(block, record + 4)?;
        let length = read_u16(block, record + 6)?;
        let flags = read_u16(block, record + 8)?;
        let charset = read_u16(block, record + 10)?;
        let null_offset = read_u32(block, record + 12)? as usize;
        let data_offset = read_u32(block, record + 16)? as usize;

        let null = read_i16(block, null_offset)? == INDICATOR_NULL;
        let data = block
            .get(data_offset..data_offset + length as usize)
            .ok_or(Error::MalformedDescriptor {
                reason: "value offset out of bounds",
            })?
            .to_vec();

        slots.push(Slot {
            sql_type,
            subtype,
            scale,
            length,
            nullable: flags & FLAG_NULLABLE != 0,
            charset,
            data,
            null,
            array_handle: None,
        });
    }

    Ok(Descriptor::from_parts(version, actual_count, slots))
}

fn read_u16(block: &[u8], offset: usize) -> Result<u16, Error> {
    block
        .get(offset..offset + 2)
        .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
        .ok_or(Error::MalformedDescriptor {
            reason: "truncated block",
        })
}

fn read_i16(block: &[u8], offset: usize) -> Result<i16, Error> {
    read_u16(block, offset).map(|value| value as i16)
}

fn read_u32(block: &[u8], offset: usize) -> Result<u32, Error> {
    block
        .get(offset..offset + 4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or(Error::MalformedDescriptor {
            reason: "truncated block",
        })
}
