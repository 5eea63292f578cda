//! Low-level primitives shared by the codecs.

/// Byte-level utilities and encoding/decoding.
///
/// Fixed-width big-endian helpers and a checked read cursor.
pub mod bytes;
