//! Sample record decoding.
//!
//! The engine streams query results as a sequence of variable-length sample
//! records packed back to back in the caller's read buffer.
//!
//! ## Record Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (32 bytes, little-endian)                            │
//! │  - Timestamp: u64 (8 bytes)                                  │
//! │  - Series ID: u64 (8 bytes)                                  │
//! │  - Value: f64 (8 bytes), tuple header when TUPLE is set      │
//! │  - Payload kind: u16 (2 bytes)                               │
//! │  - Payload size: u16 (2 bytes), length of the whole record   │
//! │  - Reserved: 4 bytes                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tuple data (TUPLE only)                                     │
//! │  - One f64 per present slot, in slot order                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tuple Header
//!
//! The value field of a tuple record is reinterpreted as a `u64`: the top six
//! bits hold the slot count N (0..=63) and the low 58 bits are a presence
//! bitmap. Absent slots decode to NaN and occupy no trailing bytes. Slots from
//! 58 up to N have no presence bit and are always absent.

use crate::error::{Result, TsdbError};
use crate::row::Row;
use bitvec::prelude::*;

/// Timestamp in nanoseconds since the Unix epoch.
pub type Timestamp = u64;

/// Engine-assigned series identifier.
pub type SeriesId = u64;

/// Record header size in bytes.
pub const HEADER_SIZE: usize = 32;

/// Number of tuple slots that carry a presence bit, and so can hold a value.
pub const MAX_TUPLE_ELEMENTS: usize = 58;

/// Largest slot count the six-bit count field can express.
pub const MAX_TUPLE_COUNT: usize = 63;

/// Largest record the engine can emit.
pub const MAX_RECORD_SIZE: usize = HEADER_SIZE + MAX_TUPLE_ELEMENTS * 8;

const TUPLE_COUNT_SHIFT: u32 = 58;
const TUPLE_BITMAP_MASK: u64 = (1 << TUPLE_COUNT_SHIFT) - 1;

/// Payload kind flags of a sample record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayloadKind(u16);

impl PayloadKind {
    /// Series id is present and resolvable.
    pub const PARAMID: u16 = 1;
    /// Timestamp is present.
    pub const TIMESTAMP: u16 = 1 << 1;
    /// Scalar float value.
    pub const FLOAT: u16 = 1 << 4;
    /// Tuple of values.
    pub const TUPLE: u16 = 1 << 6;

    /// Kind of a sample written through the write path.
    pub const FLOAT_SAMPLE: Self = Self(Self::PARAMID | Self::TIMESTAMP | Self::FLOAT);
    /// Kind of a tuple row.
    pub const TUPLE_SAMPLE: Self = Self(Self::PARAMID | Self::TIMESTAMP | Self::TUPLE);
    /// Kind of a metadata row carrying only a series id.
    pub const SERIES_ONLY: Self = Self(Self::PARAMID);

    /// Creates a PayloadKind from a raw u16 value.
    pub fn from_u16(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw u16 value.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if the series id bit is set.
    pub fn has_series(self) -> bool {
        self.0 & Self::PARAMID != 0
    }

    /// Returns true if the scalar float bit is set.
    pub fn is_float(self) -> bool {
        self.0 & Self::FLOAT != 0
    }

    /// Returns true if the tuple bit is set.
    pub fn is_tuple(self) -> bool {
        self.0 & Self::TUPLE != 0
    }
}

/// Decoded header of one sample record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleHeader {
    /// Timestamp field.
    pub timestamp: Timestamp,
    /// Series id field.
    pub series_id: SeriesId,
    /// Raw bits of the value field.
    pub value_bits: u64,
    /// Payload kind flags.
    pub kind: PayloadKind,
    /// Declared record length in bytes.
    pub size: u16,
}

impl SampleHeader {
    /// Reads and validates the header at the start of `bytes`.
    ///
    /// `offset` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::CorruptRecord` if the header is truncated, if the
    /// declared size does not fit in `bytes`, or if the declared size
    /// disagrees with the payload the kind flags describe.
    pub fn parse(bytes: &[u8], offset: usize) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(corrupt(
                offset,
                format!("truncated header: {} bytes available", bytes.len()),
            ));
        }

        let header = Self {
            timestamp: read_u64(bytes, 0),
            series_id: read_u64(bytes, 8),
            value_bits: read_u64(bytes, 16),
            kind: PayloadKind::from_u16(u16::from_le_bytes([bytes[24], bytes[25]])),
            size: u16::from_le_bytes([bytes[26], bytes[27]]),
        };

        let declared = header.record_len();
        if declared < HEADER_SIZE {
            return Err(corrupt(
                offset,
                format!("declared size {} is smaller than the header", declared),
            ));
        }
        if declared > bytes.len() {
            return Err(corrupt(
                offset,
                format!(
                    "declared size {} overruns the {} readable bytes",
                    declared,
                    bytes.len()
                ),
            ));
        }

        let expected = header.payload_len() + HEADER_SIZE;
        if declared != expected {
            return Err(corrupt(
                offset,
                format!("declared size {} but payload needs {}", declared, expected),
            ));
        }

        Ok(header)
    }

    /// Record length in bytes, as declared by the header.
    pub fn record_len(&self) -> usize {
        self.size as usize
    }

    /// Scalar value of the record.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.value_bits)
    }

    /// Number of tuple slots encoded in the value field.
    pub fn tuple_len(&self) -> usize {
        (self.value_bits >> TUPLE_COUNT_SHIFT) as usize
    }

    /// Number of slots that have a presence bit.
    fn flagged_len(&self) -> usize {
        self.tuple_len().min(MAX_TUPLE_ELEMENTS)
    }

    /// Bytes of trailing data implied by the kind flags.
    fn payload_len(&self) -> usize {
        if self.kind.is_float() || !self.kind.is_tuple() {
            return 0;
        }
        let present = presence_bits(self.value_bits)[..self.flagged_len()].count_ones();
        present * 8
    }

    /// Decodes the record body into a row.
    ///
    /// `record` must start at this header and be at least
    /// [`record_len`](Self::record_len) bytes long. `resolve` maps the series id
    /// to a name and is only called when the series bit is set.
    ///
    /// # Errors
    ///
    /// Returns `TsdbError::UnresolvedSeries` if `resolve` yields no name.
    pub fn decode_row<F>(&self, record: &[u8], resolve: F) -> Result<Row>
    where
        F: FnOnce(SeriesId) -> Option<String>,
    {
        let mut row = Row::default();

        if self.kind.has_series() {
            let name = resolve(self.series_id)
                .ok_or(TsdbError::UnresolvedSeries(self.series_id))?;
            row.series = Some(name);
            row.timestamp = Some(self.timestamp);
        }

        if self.kind.is_float() {
            row.values = vec![self.value()];
        } else if self.kind.is_tuple() {
            let count = self.tuple_len();
            let bitmap = presence_bits(self.value_bits);
            let mut packed = record
                .get(HEADER_SIZE..self.record_len())
                .unwrap_or_default()
                .chunks_exact(8);
            let mut values = Vec::with_capacity(count);
            let slots = bitmap[..self.flagged_len()]
                .iter()
                .by_vals()
                .chain(std::iter::repeat(false))
                .take(count);
            for present in slots {
                let value = if present {
                    packed
                        .next()
                        .map(|bytes| f64::from_le_bytes(bytes.try_into().unwrap_or([0; 8])))
                        .unwrap_or(f64::NAN)
                } else {
                    f64::NAN
                };
                values.push(value);
            }
            row.values = values;
        }

        Ok(row)
    }
}

/// Decodes the record at `offset` in `buf`.
///
/// Returns the row and the number of bytes the record occupies.
///
/// # Errors
///
/// Returns `TsdbError::CorruptRecord` for inconsistent framing and
/// `TsdbError::UnresolvedSeries` when the series id has no name.
pub fn decode<F>(buf: &[u8], offset: usize, resolve: F) -> Result<(Row, usize)>
where
    F: FnOnce(SeriesId) -> Option<String>,
{
    let bytes = buf.get(offset..).unwrap_or_default();
    let header = SampleHeader::parse(bytes, offset)?;
    let row = header.decode_row(bytes, resolve)?;
    Ok((row, header.record_len()))
}

/// Appends a scalar float record.
pub fn encode_scalar(out: &mut Vec<u8>, series_id: SeriesId, timestamp: Timestamp, value: f64) {
    write_header(
        out,
        timestamp,
        series_id,
        value.to_bits(),
        PayloadKind::FLOAT_SAMPLE,
        HEADER_SIZE,
    );
}

/// Appends a tuple record. `None` entries are encoded as absent slots.
///
/// # Panics
///
/// Panics if `values` has more than [`MAX_TUPLE_ELEMENTS`] entries.
pub fn encode_tuple(
    out: &mut Vec<u8>,
    series_id: SeriesId,
    timestamp: Timestamp,
    values: &[Option<f64>],
) {
    assert!(
        values.len() <= MAX_TUPLE_ELEMENTS,
        "tuple has {} slots, at most {} are supported",
        values.len(),
        MAX_TUPLE_ELEMENTS
    );
    let mut bits = (values.len() as u64) << TUPLE_COUNT_SHIFT;
    for (ix, value) in values.iter().enumerate() {
        if value.is_some() {
            bits |= 1 << ix;
        }
    }
    let present = values.iter().flatten().count();
    write_header(
        out,
        timestamp,
        series_id,
        bits,
        PayloadKind::TUPLE_SAMPLE,
        HEADER_SIZE + present * 8,
    );
    for value in values.iter().flatten() {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Appends a record that carries only a series id.
pub fn encode_series(out: &mut Vec<u8>, series_id: SeriesId) {
    write_header(out, 0, series_id, 0, PayloadKind::SERIES_ONLY, HEADER_SIZE);
}

fn write_header(
    out: &mut Vec<u8>,
    timestamp: Timestamp,
    series_id: SeriesId,
    value_bits: u64,
    kind: PayloadKind,
    size: usize,
) {
    // Timestamp (8 bytes)
    out.extend_from_slice(&timestamp.to_le_bytes());
    // Series ID (8 bytes)
    out.extend_from_slice(&series_id.to_le_bytes());
    // Value (8 bytes)
    out.extend_from_slice(&value_bits.to_le_bytes());
    // Kind (2 bytes)
    out.extend_from_slice(&kind.as_u16().to_le_bytes());
    // Size (2 bytes)
    out.extend_from_slice(&(size as u16).to_le_bytes());
    // Reserved (4 bytes)
    out.extend_from_slice(&[0u8; 4]);
}

fn presence_bits(value_bits: u64) -> BitArray<[u64; 1], Lsb0> {
    BitArray::new([value_bits & TUPLE_BITMAP_MASK])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn corrupt(offset: usize, reason: String) -> TsdbError {
    TsdbError::CorruptRecord { offset, reason }
}
