//! Decoder for packed change-notification records.
//!
//! Each record is laid out as:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | offset of the next record, 0 if last    |
//! | 4      | 4    | action code (1..=5)                     |
//! | 8      | 4    | name length in **bytes**                |
//! | 12     | n    | file name, UTF-16LE, not NUL-terminated |
//!
//! All integers are little-endian. The decoder only ever reads inside the
//! given slice. A record with a bad action or name is skipped on its own;
//! a broken header or offset ends decoding, keeping what came before.

use std::path::Path;

use super::{ChangeAction, PendingOp};
use crate::error::{CoreError, CoreResult};

const HEADER_LEN: usize = 12;

fn read_u32(buf: &[u8], at: usize) -> CoreResult<u32> {
    let bytes = buf
        .get(at..at + 4)
        .ok_or_else(|| CoreError::Decode(format!("truncated header at byte {at}")))?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(raw))
}

fn decode_name(bytes: &[u8]) -> CoreResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(CoreError::Decode("odd UTF-16 name length".to_string()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| CoreError::Decode(e.to_string()))
}

/// Outcome of decoding one buffer.
#[derive(Debug, Default)]
pub struct DecodedRecords {
    /// Operations from every well-formed record, in buffer order.
    pub ops: Vec<PendingOp>,
    /// Records dropped for an unknown action or an unusable name.
    pub skipped: Vec<CoreError>,
    /// The framing error that stopped decoding early, if any.
    pub truncated: Option<CoreError>,
}

impl DecodedRecords {
    /// `true` when every record decoded.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.truncated.is_none()
    }
}

fn decode_record(code: u32, name_bytes: &[u8], dir: &Path) -> CoreResult<PendingOp> {
    let action = ChangeAction::from_code(code)
        .ok_or_else(|| CoreError::Decode(format!("unknown action code {code}")))?;
    let name = decode_name(name_bytes)?;
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return Err(CoreError::Decode(format!(
            "name {name:?} is not a child of the watched folder"
        )));
    }
    Ok(PendingOp {
        action,
        path: dir.join(name),
    })
}

/// Decodes the records in `buf` into operations on children of `dir`.
///
/// An empty buffer decodes to no operations. Errors are reported in
/// [`CoreError::Decode`] form: per record in
/// [`DecodedRecords::skipped`] (unknown action code, empty or non-child
/// name, odd or invalid UTF-16), and in [`DecodedRecords::truncated`] when a
/// header or name runs past the buffer or the next-record offset does not
/// move forward.
pub fn decode_records(buf: &[u8], dir: &Path) -> DecodedRecords {
    let mut decoded = DecodedRecords::default();
    if buf.is_empty() {
        return decoded;
    }
    if let Err(e) = walk_records(buf, dir, &mut decoded) {
        decoded.truncated = Some(e);
    }
    decoded
}

fn walk_records(buf: &[u8], dir: &Path, decoded: &mut DecodedRecords) -> CoreResult<()> {
    let mut offset = 0usize;
    loop {
        let next = read_u32(buf, offset)? as usize;
        let code = read_u32(buf, offset + 4)?;
        let name_len = read_u32(buf, offset + 8)? as usize;

        let name_start = offset + HEADER_LEN;
        let name_bytes = name_start
            .checked_add(name_len)
            .and_then(|end| buf.get(name_start..end))
            .ok_or_else(|| CoreError::Decode(format!("name overruns buffer at byte {offset}")))?;

        match decode_record(code, name_bytes, dir) {
            Ok(op) => decoded.ops.push(op),
            Err(e) => decoded.skipped.push(e),
        }

        if next == 0 {
            return Ok(());
        }
        if next < HEADER_LEN + name_len {
            return Err(CoreError::Decode(format!(
                "next-record offset {next} overlaps record at byte {offset}"
            )));
        }
        offset = offset
            .checked_add(next)
            .filter(|o| *o < buf.len())
            .ok_or_else(|| CoreError::Decode(format!("next-record offset {next} out of bounds")))?;
    }
}

#[cfg(test)]
pub(crate) fn encode_records(records: &[(u32, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, (code, name)) in records.iter().enumerate() {
        let name_bytes: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut len = HEADER_LEN + name_bytes.len();
        // Records are 4-byte aligned.
        len = (len + 3) & !3;
        let next = if i + 1 == records.len() { 0 } else { len as u32 };
        let start = buf.len();
        buf.extend_from_slice(&next.to_le_bytes());
        buf.extend_from_slice(&code.to_le_bytes());
        buf.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&name_bytes);
        buf.resize(start + len, 0);
    }
    buf
}
