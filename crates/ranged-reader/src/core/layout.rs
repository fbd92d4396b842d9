use std::fmt;

use crate::error::{ReaderError, Result};

/// An inclusive byte range `[start, end]` of a remote object.
///
/// Inclusive bounds match the HTTP `Range` header, so a range always covers at
/// least one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end:   u64,
}

impl ByteRange {
    /// Number of bytes covered by the range.
    pub fn length(&self) -> u64 { self.end - self.start + 1 }

    /// Value for an HTTP `Range` request header.
    ///
    /// ```
    /// use ranged_reader::ByteRange;
    ///
    /// let range = ByteRange { start: 10, end: 19 };
    /// assert_eq!(range.header_value(), "bytes=10-19");
    /// ```
    pub fn header_value(&self) -> String { format!("bytes={}-{}", self.start, self.end) }

    pub(crate) fn shifted(self, offset: u64) -> Option<Self> {
        Some(Self {
            start: self.start.checked_add(offset)?,
            end:   self.end.checked_add(offset)?,
        })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}-{}", self.start, self.end) }
}

/// Split of a stream of `total_size` bytes into parts of `part_size` bytes.
///
/// Every part is exactly `part_size` long except possibly the last one, which
/// holds the remainder.
///
/// # Examples
///
/// ```
/// use ranged_reader::PartLayout;
///
/// let layout = PartLayout::new(25, 10).unwrap();
/// assert_eq!(layout.total_parts(), 3);
/// assert_eq!(layout.part_len(2), Some(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLayout {
    total_size:  u64,
    part_size:   u64,
    total_parts: u64,
}

impl PartLayout {
    /// Create a layout; fails when `part_size` is zero.
    pub fn new(total_size: u64, part_size: u64) -> Result<Self> {
        if part_size == 0 {
            return Err(ReaderError::InvalidConfig(
                "part size must be greater than 0".into(),
            ));
        }

        Ok(Self {
            total_size,
            part_size,
            total_parts: total_size.div_ceil(part_size),
        })
    }

    pub fn total_size(&self) -> u64 { self.total_size }

    pub fn part_size(&self) -> u64 { self.part_size }

    pub fn total_parts(&self) -> u64 { self.total_parts }

    /// Stream-relative byte range of part `index`, or `None` past the end.
    pub fn part_range(&self, index: u64) -> Option<ByteRange> {
        if index >= self.total_parts {
            return None;
        }

        let start = index * self.part_size;
        let end = start.saturating_add(self.part_size).min(self.total_size) - 1;
        Some(ByteRange { start, end })
    }

    /// Length of part `index` in bytes, or `None` past the end.
    pub fn part_len(&self, index: u64) -> Option<u64> { self.part_range(index).map(|r| r.length()) }
}
