#![forbid(unsafe_code)]
//! Big-endian helpers and a checked read cursor shared by the codecs.

pub mod be {
    //! Fixed-width big-endian accessors over byte slices.

    use crate::error::{GraphError, Result};

    /// Reads a big-endian `u32` from the first four bytes of `src`.
    pub fn get_u32(src: &[u8]) -> Result<u32> {
        let head: [u8; 4] = src
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| GraphError::corruption(format!("u32 needs 4 bytes, have {}", src.len())))?;
        Ok(u32::from_be_bytes(head))
    }

    /// Overwrites the first four bytes of `dst` with `v`.
    pub fn put_u32(dst: &mut [u8], v: u32) {
        dst[..4].copy_from_slice(&v.to_be_bytes());
    }
}

pub mod buf {
    //! A slice-backed cursor that reports truncation as corruption.

    use core::fmt;

    use crate::error::{GraphError, Result};

    /// A cursor for reading bytes from a slice with offset tracking.
    pub struct Cursor<'a> {
        buf: &'a [u8],
        off: usize,
    }

    impl<'a> Cursor<'a> {
        /// Creates a new cursor starting at offset 0.
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, off: 0 }
        }

        /// Takes the next `n` bytes, advancing the offset.
        pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .off
                .checked_add(n)
                .filter(|end| *end <= self.buf.len())
                .ok_or_else(|| {
                    GraphError::corruption(format!(
                        "read past end of buffer: need {n}, remaining {}",
                        self.remaining()
                    ))
                })?;
            let slice = &self.buf[self.off..end];
            self.off = end;
            Ok(slice)
        }

        /// Takes exactly `N` bytes as an array.
        pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
            let mut out = [0u8; N];
            out.copy_from_slice(self.take(N)?);
            Ok(out)
        }

        /// Reads one byte.
        pub fn u8(&mut self) -> Result<u8> {
            Ok(self.take_array::<1>()?[0])
        }

        /// Reads a big-endian `u32`.
        pub fn u32(&mut self) -> Result<u32> {
            Ok(u32::from_be_bytes(self.take_array()?))
        }

        /// Reads a big-endian `u64`.
        pub fn u64(&mut self) -> Result<u64> {
            Ok(u64::from_be_bytes(self.take_array()?))
        }

        /// Reads a `u32` length and checks it against the remaining input.
        ///
        /// `min_item_len` is the smallest encoding of one item; it bounds the
        /// count before anything is allocated for it.
        pub fn len_prefix(&mut self, min_item_len: usize) -> Result<usize> {
            let len = self.u32()? as usize;
            if min_item_len > 0 && len.saturating_mul(min_item_len) > self.remaining() {
                return Err(GraphError::corruption(format!(
                    "length prefix {len} exceeds remaining {} bytes",
                    self.remaining()
                )));
            }
            Ok(len)
        }

        /// Returns the number of bytes remaining in the buffer.
        pub fn remaining(&self) -> usize {
            self.buf.len().saturating_sub(self.off)
        }

        /// Current read offset.
        pub fn position(&self) -> usize {
            self.off
        }

        /// Bytes between `start` and the current offset.
        pub fn consumed_since(&self, start: usize) -> &'a [u8] {
            &self.buf[start.min(self.off)..self.off]
        }

        /// Fails unless every byte has been consumed.
        pub fn finish(&self, what: &str) -> Result<()> {
            if self.remaining() != 0 {
                return Err(GraphError::corruption(format!(
                    "{what}: {} trailing bytes",
                    self.remaining()
                )));
            }
            Ok(())
        }
    }

    impl<'a> fmt::Debug for Cursor<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Cursor")
                .field("off", &self.off)
                .field("remaining", &self.remaining())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{be, buf::Cursor};
    use crate::error::GraphError;

    #[test]
    fn u32_roundtrip() {
        let mut dst = [0u8; 4];
        be::put_u32(&mut dst, 0xDEAD_BEEF);
        assert_eq!(be::get_u32(&dst).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn cursor_take_reports_overread() {
        let mut cur = Cursor::new(&[1, 2, 3]);
        let err = cur.take(4).unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)));
        assert_eq!(cur.remaining(), 3, "failed take must not advance");
    }

    #[test]
    fn len_prefix_rejects_counts_larger_than_input() {
        let data = [0, 0, 0, 9, 1, 2];
        let mut cur = Cursor::new(&data);
        assert!(cur.len_prefix(1).is_err());
    }

    #[test]
    fn finish_flags_trailing_bytes() {
        let data = [0, 0, 0, 1, 7];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.u32().unwrap(), 1);
        assert!(cur.finish("record").is_err());
        assert_eq!(cur.u8().unwrap(), 7);
        assert!(cur.finish("record").is_ok());
        assert_eq!(cur.consumed_since(0), &data[..]);
    }
}
