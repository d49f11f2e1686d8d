//! Builders and parsers for the statement-info call.
//!
//! The response buffer is a stream of `(item, u16 length, payload)` entries terminated by
//! [`INFO_END`]. The records item nests a second stream of per-operation counters inside its
//! payload.

use crate::error::Error;

/// Terminates an info entry stream.
pub const INFO_END: u8 = 1;
/// The response did not fit the supplied buffer.
pub const INFO_TRUNCATED: u8 = 2;
/// Statement type code of the prepared statement.
pub const INFO_SQL_STMT_TYPE: u8 = 21;
/// Per-operation record counters of the last execution.
pub const INFO_SQL_RECORDS: u8 = 23;

/// Counter of records read by selects within the request.
pub const INFO_REQ_SELECT_COUNT: u8 = 13;
/// Counter of inserted records.
pub const INFO_REQ_INSERT_COUNT: u8 = 14;
/// Counter of updated records.
pub const INFO_REQ_UPDATE_COUNT: u8 = 15;
/// Counter of deleted records.
pub const INFO_REQ_DELETE_COUNT: u8 = 16;

/// Response buffer size for the statement type query.
pub const STATEMENT_TYPE_BUFFER_LEN: usize = 8;
/// Response buffer size for the records query.
pub const RECORDS_BUFFER_LEN: usize = 64;

/// Item list asking for the statement type.
pub fn statement_type_request() -> [u8; 1] {
    [INFO_SQL_STMT_TYPE]
}

/// Item list asking for the per-operation record counters.
pub fn records_request() -> [u8; 1] {
    [INFO_SQL_RECORDS]
}

/// Extract the statement type code from a statement-info response.
pub fn parse_statement_type(buffer: &[u8]) -> Result<i64, Error> {
    let payload = find_item(buffer, INFO_SQL_STMT_TYPE)?;
    read_le_int(payload)
}

/// Sum the inserted, updated and deleted record counters of a records response. The select
/// counter does not contribute to records affected.
pub fn parse_records_affected(buffer: &[u8]) -> Result<i64, Error> {
    let payload = find_item(buffer, INFO_SQL_RECORDS)?;
    let mut affected = 0;
    let mut entries = Entries { buffer: payload };
    while let Some((item, value)) = entries.next_entry()? {
        match item {
            INFO_REQ_INSERT_COUNT | INFO_REQ_UPDATE_COUNT | INFO_REQ_DELETE_COUNT => {
                affected += read_le_int(value)?;
            }
            _ => (),
        }
    }
    Ok(affected)
}

/// Locate the payload of `wanted` within a response stream.
fn find_item(buffer: &[u8], wanted: u8) -> Result<&[u8], Error> {
    let mut entries = Entries { buffer };
    while let Some((item, payload)) = entries.next_entry()? {
        if item == wanted {
            return Ok(payload);
        }
    }
    Err(Error::MalformedInfoBuffer)
}

/// Iterator-ish walk over `(item, length, payload)` entries. Not an [`Iterator`] because entries
/// can fail to parse.
struct Entries<'a> {
    buffer: &'a [u8],
}

impl<'a> Entries<'a> {
    fn next_entry(&mut self) -> Result<Option<(u8, &'a [u8])>, Error> {
        let &item = match self.buffer.first() {
            None => return Ok(None),
            Some(item) => item,
        };
        if item == INFO_END {
            return Ok(None);
        }
        if item == INFO_TRUNCATED {
            // The response did not fit. Callers size their buffers generously, so this marks a
            // protocol violation rather than a retry opportunity at this layer.
            return Err(Error::MalformedInfoBuffer);
        }
        let length = self
            .buffer
            .get(1..3)
            .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
            .ok_or(Error::MalformedInfoBuffer)?;
        let payload = self
            .buffer
            .get(3..3 + length)
            .ok_or(Error::MalformedInfoBuffer)?;
        self.buffer = &self.buffer[3 + length..];
        Ok(Some((item, payload)))
    }
}

/// Little-endian integer of one, two, four or eight bytes.
fn read_le_int(payload: &[u8]) -> Result<i64, Error> {
    match payload.len() {
        1 => Ok(payload[0] as i64),
        2 => Ok(i16::from_le_bytes([payload[0], payload[1]]) as i64),
        4 => Ok(i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as i64),
        8 => Ok(i64::from_le_bytes(payload.try_into().unwrap())),
        _ => Err(Error::MalformedInfoBuffer),
    }
}

/// Append one `(item, length, payload)` entry to a response stream. Provided for engine
/// implementations and test fakes answering info queries.
pub fn write_entry(buffer: &mut Vec<u8>, item: u8, payload: &[u8]) {
    buffer.push(item);
    buffer.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buffer.extend_from_slice(payload);
}
