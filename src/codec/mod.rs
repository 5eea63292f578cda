#![forbid(unsafe_code)]
//! Serialized record codec.
//!
//! Values are written big-endian with fixed widths so identical values always
//! produce identical bytes. A *blob* is a record prefixed with its own total
//! length (`u32`, counting the prefix itself), which lets the partition store
//! keep one allocation per vertex and hand it out verbatim.

use std::io::Read;

use crate::error::{GraphError, Result};
use crate::primitives::bytes::{be, buf::Cursor};

/// Width of the length prefix at the front of every blob.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Binary encoding shared by identifiers, values and messages.
pub trait Codec: Sized {
    /// Smallest number of bytes any value of this type encodes to.
    const MIN_ENCODED_LEN: usize;

    /// Appends the encoding of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decodes one value from the cursor.
    fn decode(cur: &mut Cursor<'_>) -> Result<Self>;

    /// Decodes into an existing value, reusing its allocations where the
    /// type has any.
    fn decode_into(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        *self = Self::decode(cur)?;
        Ok(())
    }

    /// Appends the encoding of exactly one value read from `input` to `out`
    /// without decoding it.
    fn copy_encoded(input: &mut dyn Read, out: &mut Vec<u8>) -> Result<()>;
}

macro_rules! fixed_width_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Codec for $ty {
                const MIN_ENCODED_LEN: usize = core::mem::size_of::<$ty>();

                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_be_bytes());
                }

                fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
                    Ok(<$ty>::from_be_bytes(cur.take_array()?))
                }

                fn copy_encoded(input: &mut dyn Read, out: &mut Vec<u8>) -> Result<()> {
                    copy_exact(input, out, core::mem::size_of::<$ty>())
                }
            }
        )*
    };
}

fixed_width_codec!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Codec for bool {
    const MIN_ENCODED_LEN: usize = 1;

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        match cur.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GraphError::corruption(format!("invalid bool byte 0x{other:02X}"))),
        }
    }

    fn copy_encoded(input: &mut dyn Read, out: &mut Vec<u8>) -> Result<()> {
        copy_exact(input, out, 1)
    }
}

impl Codec for () {
    const MIN_ENCODED_LEN: usize = 0;

    fn encode(&self, _out: &mut Vec<u8>) {}

    fn decode(_cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(())
    }

    fn copy_encoded(_input: &mut dyn Read, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

impl Codec for String {
    const MIN_ENCODED_LEN: usize = 4;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len() as u32).to_be_bytes());
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let len = cur.len_prefix(1)?;
        let body = cur.take(len)?;
        String::from_utf8(body.to_vec())
            .map_err(|_| GraphError::corruption("string is not valid UTF-8"))
    }

    fn decode_into(&mut self, cur: &mut Cursor<'_>) -> Result<()> {
        let len = cur.len_prefix(1)?;
        let body = core::str::from_utf8(cur.take(len)?)
            .map_err(|_| GraphError::corruption("string is not valid UTF-8"))?;
        self.clear();
        self.push_str(body);
        Ok(())
    }

    fn copy_encoded(input: &mut dyn Read, out: &mut Vec<u8>) -> Result<()> {
        let at = out.len();
        copy_exact(input, out, 4)?;
        let len = be::get_u32(&out[at..])? as usize;
        copy_exact(input, out, len)
    }
}

/// Appends exactly `n` bytes of `input` to `out`.
///
/// The buffer grows only with bytes actually read, so a corrupt length cannot
/// force a large allocation. A stream that ends early is corruption and
/// leaves `out` as it was.
pub fn copy_exact(input: &mut dyn Read, out: &mut Vec<u8>, n: usize) -> Result<()> {
    let at = out.len();
    let read = Read::take(&mut *input, n as u64).read_to_end(out)?;
    if read != n {
        out.truncate(at);
        return Err(GraphError::corruption(format!(
            "stream ended after {read} of {n} bytes"
        )));
    }
    Ok(())
}

/// Encodes `value` into `out` as a blob, replacing the previous contents but
/// keeping the allocation.
pub fn encode_with_size<T: Codec>(value: &T, out: &mut Vec<u8>) -> Result<()> {
    out.clear();
    out.extend_from_slice(&[0u8; SIZE_PREFIX_LEN]);
    value.encode(out);
    let total = u32::try_from(out.len()).map_err(|_| {
        GraphError::InvalidArgument(format!("record of {} bytes exceeds u32 framing", out.len()))
    })?;
    be::put_u32(out, total);
    Ok(())
}

/// Encodes `value` into a freshly allocated blob.
pub fn to_bytes_with_size<T: Codec>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_with_size(value, &mut out)?;
    Ok(out)
}

/// Reads the length a blob declares for itself.
pub fn declared_size(blob: &[u8]) -> Result<usize> {
    let size = be::get_u32(blob)? as usize;
    if size < SIZE_PREFIX_LEN {
        return Err(GraphError::corruption(format!(
            "blob declares {size} bytes, smaller than its own prefix"
        )));
    }
    Ok(size)
}

/// Returns the record bytes of a blob after checking its inner length.
pub fn blob_body(blob: &[u8]) -> Result<&[u8]> {
    let size = declared_size(blob)?;
    if size != blob.len() {
        return Err(GraphError::corruption(format!(
            "blob declares {size} bytes but holds {}",
            blob.len()
        )));
    }
    Ok(&blob[SIZE_PREFIX_LEN..])
}

/// Decodes a blob into a new value.
pub fn decode_with_size<T: Codec>(blob: &[u8]) -> Result<T> {
    let mut cur = Cursor::new(blob_body(blob)?);
    let value = T::decode(&mut cur)?;
    cur.finish("blob")?;
    Ok(value)
}

/// Decodes a blob into `target`, reusing its allocations.
pub fn decode_into_with_size<T: Codec>(blob: &[u8], target: &mut T) -> Result<()> {
    let mut cur = Cursor::new(blob_body(blob)?);
    target.decode_into(&mut cur)?;
    cur.finish("blob")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_values_are_big_endian() {
        let mut out = Vec::new();
        7i32.encode(&mut out);
        (-2i64).encode(&mut out);
        assert_eq!(&out[..4], &[0, 0, 0, 7]);
        let mut cur = Cursor::new(&out);
        assert_eq!(i32::decode(&mut cur).unwrap(), 7);
        assert_eq!(i64::decode(&mut cur).unwrap(), -2);
        cur.finish("values").unwrap();
    }

    #[test]
    fn blob_prefix_counts_itself() {
        let blob = to_bytes_with_size(&42u64).unwrap();
        assert_eq!(blob.len(), SIZE_PREFIX_LEN + 8);
        assert_eq!(declared_size(&blob).unwrap(), blob.len());
        assert_eq!(decode_with_size::<u64>(&blob).unwrap(), 42);
    }

    #[test]
    fn encode_with_size_reuses_allocation() {
        let mut buf = to_bytes_with_size(&String::from("a much longer string value")).unwrap();
        let capacity = buf.capacity();
        encode_with_size(&String::from("short"), &mut buf).unwrap();
        assert_eq!(buf.capacity(), capacity);
        assert_eq!(decode_with_size::<String>(&buf).unwrap(), "short");
    }

    #[test]
    fn inner_length_mismatch_is_corruption() {
        let mut blob = to_bytes_with_size(&1u32).unwrap();
        blob.push(0);
        let err = decode_with_size::<u32>(&blob).unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)), "{err}");
    }

    #[test]
    fn copy_encoded_stops_at_the_value_boundary() {
        let mut stream = Vec::new();
        String::from("vertex-17").encode(&mut stream);
        9u16.encode(&mut stream);
        let mut input = std::io::Cursor::new(stream);

        let mut copied = Vec::new();
        String::copy_encoded(&mut input, &mut copied).unwrap();
        assert_eq!(String::decode(&mut Cursor::new(&copied)).unwrap(), "vertex-17");
        u16::copy_encoded(&mut input, &mut copied).unwrap();
        assert_eq!(&copied[copied.len() - 2..], &[0, 9]);

        let before = copied.clone();
        let err = u32::copy_encoded(&mut input, &mut copied).unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)), "{err}");
        assert_eq!(copied, before);
    }

    #[test]
    fn invalid_bool_byte_is_rejected() {
        let mut cur = Cursor::new(&[2]);
        assert!(bool::decode(&mut cur).is_err());
    }
}
