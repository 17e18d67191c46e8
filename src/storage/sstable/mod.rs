//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format (big-endian)
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Block (variable)                                   │
//! │   [KeyLen: i32][Key][Marker: i64]                       │
//! │   live only: [ExpiresAt: i64][ValLen: i32][Value]       │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Offset Block (4 * rows bytes)                           │
//! │   [Offset: i32] per entry, relative to file start       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                        │
//! │   Rows: i32                                             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Marker >= 0 is the timestamp of a live value. Marker < 0 is a tombstone
//! whose timestamp is `-(marker + 1)`. ExpiresAt is -1 when the value never
//! expires. Offsets and rows sit at the tail so both are found from the file
//! length alone.

mod builder;
mod iterator;
mod reader;

pub use builder::SsTableBuilder;
pub use iterator::SsTableIter;
pub use reader::SsTable;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Footer size: Rows (4)
pub(crate) const FOOTER_SIZE: usize = 4;

/// Size of one offset slot
pub(crate) const OFFSET_SIZE: usize = 4;

/// ExpiresAt value for cells without a deadline
pub(crate) const NO_EXPIRY: i64 = -1;

// =============================================================================
// Marker Encoding
// =============================================================================

/// Encode the timestamp/status marker of a cell
pub(crate) fn encode_marker(timestamp: u64, tombstone: bool) -> i64 {
    let timestamp = timestamp.min(i64::MAX as u64) as i64;
    if tombstone {
        -timestamp - 1
    } else {
        timestamp
    }
}

/// Encode an expiry deadline; far deadlines clamp to `i64::MAX` so they never
/// collide with `NO_EXPIRY`
pub(crate) fn encode_expiry(expires_at: Option<u64>) -> i64 {
    expires_at.map_or(NO_EXPIRY, |at| at.min(i64::MAX as u64) as i64)
}

pub(crate) fn decode_expiry(raw: i64) -> Option<u64> {
    (raw >= 0).then_some(raw as u64)
}

/// Decode a marker into `(timestamp, is_tombstone)`
pub(crate) fn decode_marker(marker: i64) -> (u64, bool) {
    if marker >= 0 {
        (marker as u64, false)
    } else {
        ((-(marker + 1)) as u64, true)
    }
}

// =============================================================================
// Fixed-width reads over a byte slice
// =============================================================================

/// Read a big-endian i32 at `pos`; `None` if it would run past the slice
pub(crate) fn read_i32(buf: &[u8], pos: usize) -> Option<i32> {
    let bytes = buf.get(pos..pos.checked_add(4)?)?;
    Some(i32::from_be_bytes(bytes.try_into().ok()?))
}

/// Read a big-endian i64 at `pos`; `None` if it would run past the slice
pub(crate) fn read_i64(buf: &[u8], pos: usize) -> Option<i64> {
    let bytes = buf.get(pos..pos.checked_add(8)?)?;
    Some(i64::from_be_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_distinguishes_tombstones() {
        assert_eq!(decode_marker(encode_marker(42, false)), (42, false));
        assert_eq!(decode_marker(encode_marker(42, true)), (42, true));
        assert_eq!(decode_marker(encode_marker(0, true)), (0, true));
        assert_eq!(decode_marker(encode_marker(0, false)), (0, false));
    }

    #[test]
    fn test_far_deadline_is_not_no_expiry() {
        assert_eq!(encode_expiry(None), NO_EXPIRY);
        assert_eq!(encode_expiry(Some(u64::MAX)), i64::MAX);
        assert_eq!(decode_expiry(encode_expiry(Some(u64::MAX))), Some(i64::MAX as u64));
        assert_eq!(decode_expiry(encode_expiry(Some(7))), Some(7));
        assert_eq!(decode_expiry(NO_EXPIRY), None);
    }

    #[test]
    fn test_reads_are_bounds_checked() {
        let buf = [0u8, 0, 0, 7, 1];
        assert_eq!(read_i32(&buf, 0), Some(7));
        assert_eq!(read_i32(&buf, 2), None);
        assert_eq!(read_i64(&buf, 0), None);
    }
}
