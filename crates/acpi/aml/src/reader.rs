//! Bounds-checked little-endian byte cursor.
//!
//! [`BinaryReader`] walks a byte slice up to an exclusive `end` limit. Every
//! read returns `None` instead of panicking when it would cross the limit,
//! which lets the AML decoder turn truncation into a parse error rather than
//! undefined behaviour. Sub-readers created with [`BinaryReader::sub`] share
//! the same backing slice (so offsets stay absolute) but can never read past
//! the enclosing package.

/// A cursor over a byte slice with an upper read limit.
#[derive(Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> BinaryReader<'a> {
    /// Creates a reader over the whole of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
        }
    }

    /// Creates a reader over `data[start..end]` that reports absolute offsets.
    ///
    /// Returns `None` if the range is not contained in `data`.
    #[must_use]
    pub fn with_range(data: &'a [u8], start: usize, end: usize) -> Option<Self> {
        if start > end || end > data.len() {
            return None;
        }
        Some(Self {
            data,
            pos: start,
            end,
        })
    }

    /// Returns a reader positioned at the current offset and limited to `end`.
    ///
    /// Returns `None` if `end` lies before the cursor or beyond this reader's
    /// own limit.
    #[must_use]
    pub fn sub(&self, end: usize) -> Option<Self> {
        if end < self.pos || end > self.end {
            return None;
        }
        Some(Self {
            data: self.data,
            pos: self.pos,
            end,
        })
    }

    /// Current absolute offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Exclusive upper limit of this reader.
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Returns `true` once the cursor has reached the limit.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// The unread bytes up to the limit.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..self.end).unwrap_or(&[])
    }

    /// The full backing slice.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Moves the cursor to an absolute offset within `[position, end]`.
    ///
    /// Seeking backwards is allowed as long as the target is not before the
    /// start of the backing slice; it is used to re-evaluate `While`
    /// predicates.
    pub fn seek(&mut self, pos: usize) -> Option<()> {
        if pos > self.end {
            return None;
        }
        self.pos = pos;
        Some(())
    }

    /// Peeks at the next byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    /// Peeks `offset` bytes ahead without consuming anything.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        let at = self.pos.checked_add(offset)?;
        if at >= self.end {
            return None;
        }
        self.data.get(at).copied()
    }

    /// Advances the cursor by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Option<()> {
        let next = self.pos.checked_add(n)?;
        if next > self.end {
            return None;
        }
        self.pos = next;
        Some(())
    }

    /// Reads `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let start = self.pos;
        self.skip(n)?;
        self.data.get(start..self.pos)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Option<u8> {
        let v = self.peek()?;
        self.pos += 1;
        Some(v)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Option<u16> {
        let b = self.read_bytes(2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Option<u32> {
        let b = self.read_bytes(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Option<u64> {
        let b = self.read_bytes(8)?;
        Some(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_u16(), Some(0x1234));
        assert_eq!(r.read_u32(), Some(0x1234_5678));
        assert!(r.is_at_end());
        assert_eq!(r.read_u8(), None);
    }

    #[test]
    fn sub_reader_cannot_escape_limit() {
        let data = [1, 2, 3, 4, 5];
        let mut r = BinaryReader::new(&data);
        r.skip(1).unwrap();
        let mut sub = r.sub(3).unwrap();
        assert_eq!(sub.read_u8(), Some(2));
        assert_eq!(sub.read_u8(), Some(3));
        assert_eq!(sub.read_u8(), None);
        assert_eq!(sub.position(), 3);
        assert!(r.sub(6).is_none());
    }

    #[test]
    fn failed_read_does_not_advance() {
        let data = [1, 2, 3];
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_u32(), None);
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u16(), Some(0x0201));
    }
}
