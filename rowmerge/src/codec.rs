//! Versioned binary format for row values.
//!
//! Wire format (all integers big-endian):
//! ```text
//! ┌─────────┬───────┬──────────────────────────────┬──────────┬─────────────┐
//! │ version │ flags │ row tombstone (if flags & 1) │ count    │ columns...  │
//! │ 1 byte  │ 1 byte│ i64 mfda + u32 ldt           │ 4 bytes  │             │
//! └─────────┴───────┴──────────────────────────────┴──────────┴─────────────┘
//!
//! column: ┌─────┬──────────┬──────┬───────────┬──────────────────────────────┐
//!         │ tag │ name_len │ name │ timestamp │ Value: u32 len + payload     │
//!         │ 1 B │ 2 bytes  │ var  │ 8 bytes   │ Tombstone: u32 deletion time │
//!         └─────┴──────────┴──────┴───────────┴──────────────────────────────┘
//! ```
//!
//! Columns are written in ascending name order and decoding rejects any
//! other order, so each logical row has exactly one encoding.

use std::collections::BTreeMap;

use crate::error::MergeError;
use crate::row::{Column, RowTombstone, RowValue};

/// Current format version tag.
pub const FORMAT_VERSION: u8 = 1;

const FLAG_ROW_TOMBSTONE: u8 = 0x01;
const KNOWN_FLAGS: u8 = FLAG_ROW_TOMBSTONE;

const TAG_VALUE: u8 = 0;
const TAG_TOMBSTONE: u8 = 1;

const HEADER_SIZE: usize = 1 + 1 + 4;
const ROW_TOMBSTONE_SIZE: usize = 8 + 4;
/// tag + name_len + timestamp
const COLUMN_FIXED_SIZE: usize = 1 + 2 + 8;
/// Smallest possible column record: empty name, tombstone body.
const MIN_COLUMN_SIZE: usize = COLUMN_FIXED_SIZE + 4;

/// Exact number of bytes [`encode`] appends for `row`.
pub fn serialized_size(row: &RowValue) -> usize {
    let mut size = HEADER_SIZE;
    if row.row_tombstone().is_some() {
        size += ROW_TOMBSTONE_SIZE;
    }
    for (name, column) in row.columns() {
        size += COLUMN_FIXED_SIZE + name.len() + 4;
        if let Column::Value { value, .. } = column {
            size += value.len();
        }
    }
    size
}

/// Append the canonical encoding of `row` to `out`.
///
/// On error nothing is appended.
pub fn encode(row: &RowValue, out: &mut Vec<u8>) -> Result<(), MergeError> {
    check_limits(row)?;

    out.reserve(serialized_size(row));
    out.push(FORMAT_VERSION);
    match row.row_tombstone() {
        Some(tombstone) => {
            out.push(FLAG_ROW_TOMBSTONE);
            out.extend_from_slice(&tombstone.marked_for_delete_at.to_be_bytes());
            out.extend_from_slice(&tombstone.local_deletion_time.to_be_bytes());
        }
        None => out.push(0),
    }

    out.extend_from_slice(&(row.column_count() as u32).to_be_bytes());
    for (name, column) in row.columns() {
        match column {
            Column::Value { timestamp, value } => {
                out.push(TAG_VALUE);
                put_name(out, name);
                out.extend_from_slice(&timestamp.to_be_bytes());
                out.extend_from_slice(&(value.len() as u32).to_be_bytes());
                out.extend_from_slice(value);
            }
            Column::Tombstone {
                timestamp,
                local_deletion_time,
            } => {
                out.push(TAG_TOMBSTONE);
                put_name(out, name);
                out.extend_from_slice(&timestamp.to_be_bytes());
                out.extend_from_slice(&local_deletion_time.to_be_bytes());
            }
        }
    }
    Ok(())
}

/// Encode into a freshly allocated, exactly sized buffer.
pub fn encode_to_vec(row: &RowValue) -> Result<Vec<u8>, MergeError> {
    let mut out = Vec::with_capacity(serialized_size(row));
    encode(row, &mut out)?;
    Ok(out)
}

/// Decode one row value. Total: every malformed input yields an error.
pub fn decode(bytes: &[u8]) -> Result<RowValue, MergeError> {
    let mut reader = Reader::new(bytes);

    let version = reader.u8()?;
    if version != FORMAT_VERSION {
        return Err(MergeError::malformed(0, "unsupported format version"));
    }
    let flags = reader.u8()?;
    if flags & !KNOWN_FLAGS != 0 {
        return Err(MergeError::malformed(1, "unknown flag bits"));
    }

    let row_tombstone = if flags & FLAG_ROW_TOMBSTONE != 0 {
        let marked_for_delete_at = reader.i64()?;
        let local_deletion_time = reader.u32()?;
        Some(RowTombstone::new(marked_for_delete_at, local_deletion_time))
    } else {
        None
    };

    let count = reader.u32()? as usize;
    if count > reader.remaining() / MIN_COLUMN_SIZE {
        return Err(MergeError::malformed(reader.offset(), "column count exceeds input"));
    }

    let mut columns = BTreeMap::new();
    let mut previous: Option<&[u8]> = None;
    for _ in 0..count {
        let record_start = reader.offset();
        let tag = reader.u8()?;
        let name_len = reader.u16()? as usize;
        let name = reader.bytes(name_len)?;
        if previous.is_some_and(|prev| prev >= name) {
            return Err(MergeError::malformed(record_start, "column names not strictly ascending"));
        }
        let timestamp = reader.i64()?;
        let column = match tag {
            TAG_VALUE => {
                let len = reader.u32()? as usize;
                Column::Value {
                    timestamp,
                    value: reader.bytes(len)?.to_vec(),
                }
            }
            TAG_TOMBSTONE => Column::Tombstone {
                timestamp,
                local_deletion_time: reader.u32()?,
            },
            _ => return Err(MergeError::malformed(record_start, "unknown column tag")),
        };
        columns.insert(name.to_vec(), column);
        previous = Some(name);
    }

    if reader.remaining() != 0 {
        return Err(MergeError::malformed(reader.offset(), "trailing bytes"));
    }

    Ok(RowValue::new(row_tombstone, columns))
}

fn check_limits(row: &RowValue) -> Result<(), MergeError> {
    if row.column_count() > u32::MAX as usize {
        return Err(MergeError::Oversized("column count"));
    }
    for (name, column) in row.columns() {
        if name.len() > u16::MAX as usize {
            return Err(MergeError::Oversized("column name"));
        }
        if let Column::Value { value, .. } = column {
            if value.len() > u32::MAX as usize {
                return Err(MergeError::Oversized("column value"));
            }
        }
    }
    Ok(())
}

fn put_name(out: &mut Vec<u8>, name: &[u8]) {
    out.extend_from_slice(&(name.len() as u16).to_be_bytes());
    out.extend_from_slice(name);
}

/// Bounds-checked cursor over an input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], MergeError> {
        if len > self.remaining() {
            return Err(MergeError::malformed(self.pos, "truncated input"));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MergeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MergeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, MergeError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, MergeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, MergeError> {
        Ok(i64::from_be_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> RowValue {
        RowValue::builder()
            .row_tombstone(3, 1_700_000_000)
            .value("email", 10, "a@example.com")
            .tombstone("phone", 12, 1_700_000_100)
            .value("name", -5, "")
            .build()
    }

    #[test]
    fn test_roundtrip() {
        let row = sample_row();
        let bytes = encode_to_vec(&row).unwrap();
        assert_eq!(decode(&bytes).unwrap(), row);
    }

    #[test]
    fn test_empty_row_layout() {
        let bytes = encode_to_vec(&RowValue::empty()).unwrap();
        assert_eq!(bytes, vec![FORMAT_VERSION, 0, 0, 0, 0, 0]);
        assert_eq!(decode(&bytes).unwrap(), RowValue::empty());
    }

    #[test]
    fn test_exact_layout_single_value() {
        let row = RowValue::builder().value("k", 1, "v").build();
        let bytes = encode_to_vec(&row).unwrap();
        let mut expected = vec![FORMAT_VERSION, 0, 0, 0, 0, 1];
        expected.push(TAG_VALUE);
        expected.extend_from_slice(&[0, 1, b'k']);
        expected.extend_from_slice(&1i64.to_be_bytes());
        expected.extend_from_slice(&[0, 0, 0, 1, b'v']);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_serialized_size_is_exact() {
        for row in [RowValue::empty(), RowValue::row_delete(1, 2), sample_row()] {
            let bytes = encode_to_vec(&row).unwrap();
            assert_eq!(serialized_size(&row), bytes.len());
            assert_eq!(row.size(), bytes.len());
        }
    }

    #[test]
    fn test_encode_appends() {
        let mut out = b"prefix".to_vec();
        encode(&sample_row(), &mut out).unwrap();
        assert!(out.starts_with(b"prefix"));
        assert_eq!(decode(&out[6..]).unwrap(), sample_row());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = RowValue::builder().value("x", 1, "1").value("y", 2, "2").build();
        let b = RowValue::builder().value("y", 2, "2").value("x", 1, "1").build();
        assert_eq!(encode_to_vec(&a).unwrap(), encode_to_vec(&b).unwrap());
    }

    #[test]
    fn test_every_truncation_fails() {
        let bytes = encode_to_vec(&sample_row()).unwrap();
        for len in 0..bytes.len() {
            let err = decode(&bytes[..len]).unwrap_err();
            assert!(err.is_malformed(), "prefix of {len} bytes decoded");
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = encode_to_vec(&sample_row()).unwrap();
        bytes[0] = 2;
        assert!(matches!(
            decode(&bytes),
            Err(MergeError::MalformedInput { offset: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_flags() {
        let mut bytes = encode_to_vec(&RowValue::empty()).unwrap();
        bytes[1] = 0x80;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_unknown_column_tag() {
        let row = RowValue::builder().value("k", 1, "v").build();
        let mut bytes = encode_to_vec(&row).unwrap();
        bytes[HEADER_SIZE] = 7;
        let err = decode(&bytes).unwrap_err();
        assert_eq!(err, MergeError::malformed(HEADER_SIZE, "unknown column tag"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_to_vec(&sample_row()).unwrap();
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_duplicate_and_unordered_names_rejected() {
        let a = encode_to_vec(&RowValue::builder().value("a", 1, "x").build()).unwrap();
        let b = encode_to_vec(&RowValue::builder().value("b", 1, "x").build()).unwrap();
        let record_a = &a[HEADER_SIZE..];
        let record_b = &b[HEADER_SIZE..];

        let mut dup = vec![FORMAT_VERSION, 0, 0, 0, 0, 2];
        dup.extend_from_slice(record_a);
        dup.extend_from_slice(record_a);
        assert!(decode(&dup).is_err());

        let mut unordered = vec![FORMAT_VERSION, 0, 0, 0, 0, 2];
        unordered.extend_from_slice(record_b);
        unordered.extend_from_slice(record_a);
        assert!(decode(&unordered).is_err());

        let mut ordered = vec![FORMAT_VERSION, 0, 0, 0, 0, 2];
        ordered.extend_from_slice(record_a);
        ordered.extend_from_slice(record_b);
        assert_eq!(decode(&ordered).unwrap().column_count(), 2);
    }

    #[test]
    fn test_huge_count_does_not_allocate() {
        let bytes = vec![FORMAT_VERSION, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_huge_value_length_rejected() {
        let mut bytes = vec![FORMAT_VERSION, 0, 0, 0, 0, 1, TAG_VALUE, 0, 0];
        bytes.extend_from_slice(&0i64.to_be_bytes());
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_oversized_name_not_encoded() {
        let row = RowValue::builder()
            .value(vec![b'n'; u16::MAX as usize + 1], 1, "v")
            .build();
        let mut out = b"keep".to_vec();
        assert_eq!(encode(&row, &mut out), Err(MergeError::Oversized("column name")));
        assert_eq!(out, b"keep");
    }
}
