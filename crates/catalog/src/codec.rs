//! Binary read/write primitives for the index file formats.
//!
//! All multi-byte integers are big-endian. Byte strings are length-prefixed
//! with a single byte, limiting them to [`MAX_STR_LEN`] bytes. The primitives
//! carry no error signaling of their own; truncation surfaces as
//! `io::ErrorKind::UnexpectedEof` from the underlying stream, and the
//! slice-based readers return `None` when the buffer runs short.

use std::io::{self, Read, Write};

/// Maximum length of a length-prefixed byte string.
pub const MAX_STR_LEN: usize = 255;

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

/// Writes the low 24 bits; values above `0x00FF_FFFF` saturate.
pub fn write_u24<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    let v = v.min(0x00FF_FFFF);
    w.write_all(&v.to_be_bytes()[1..])
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

/// Writes a length-prefixed byte string. The caller must ensure
/// `bytes.len() <= MAX_STR_LEN`.
pub fn write_str<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    debug_assert!(bytes.len() <= MAX_STR_LEN);
    w.write_all(&[bytes.len() as u8])?;
    w.write_all(bytes)
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_u24<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 3];
    r.read_exact(&mut buf)?;
    Ok(u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]))
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads a length-prefixed byte string into a fresh buffer.
pub fn read_str<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u8(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Slice-based accessors (used for the in-memory name heap)
// ---------------------------------------------------------------------------

/// Writes a big-endian u16 at the start of `buf`.
pub fn put_u16(buf: &mut [u8], v: u16) {
    buf[..2].copy_from_slice(&v.to_be_bytes());
}

/// Writes a length-prefixed byte string at the start of `buf`. The caller
/// must ensure the buffer fits `bytes.len() + 1` and the length is at most
/// [`MAX_STR_LEN`].
pub fn put_str(buf: &mut [u8], bytes: &[u8]) {
    debug_assert!(bytes.len() <= MAX_STR_LEN);
    buf[0] = bytes.len() as u8;
    buf[1..1 + bytes.len()].copy_from_slice(bytes);
}

/// Reads a big-endian u16 from the start of `buf`, or `None` if short.
pub fn get_u16(buf: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Reads a length-prefixed byte string from the start of `buf`.
pub fn get_str(buf: &[u8]) -> Option<&[u8]> {
    let len = *buf.first()? as usize;
    buf.get(1..1 + len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_roundtrip() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 0xAB).unwrap();
        write_u16(&mut buf, 0x1234).unwrap();
        write_u24(&mut buf, 0x00ABCDEF).unwrap();
        write_u32(&mut buf, 0xDEADBEEF).unwrap();
        write_u64(&mut buf, 0x0123_4567_89AB_CDEF).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(read_u8(&mut r).unwrap(), 0xAB);
        assert_eq!(read_u16(&mut r).unwrap(), 0x1234);
        assert_eq!(read_u24(&mut r).unwrap(), 0x00ABCDEF);
        assert_eq!(read_u32(&mut r).unwrap(), 0xDEADBEEF);
        assert_eq!(read_u64(&mut r).unwrap(), 0x0123_4567_89AB_CDEF);
        assert!(r.is_empty());
    }

    #[test]
    fn integers_are_big_endian() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0x0102).unwrap();
        assert_eq!(buf, [0x01, 0x02]);
    }

    #[test]
    fn u24_saturates() {
        let mut buf = Vec::new();
        write_u24(&mut buf, 0x1234_5678).unwrap();
        assert_eq!(read_u24(&mut buf.as_slice()).unwrap(), 0x00FF_FFFF);
    }

    #[test]
    fn str_roundtrip() {
        let mut buf = Vec::new();
        write_str(&mut buf, b"hello.tap").unwrap();
        write_str(&mut buf, b"").unwrap();
        let mut r = buf.as_slice();
        assert_eq!(read_str(&mut r).unwrap(), b"hello.tap");
        assert_eq!(read_str(&mut r).unwrap(), b"");
    }

    #[test]
    fn truncation_is_unexpected_eof() {
        let buf = [0x05, b'a', b'b'];
        let err = read_str(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn slice_accessors() {
        let mut buf = [0u8; 8];
        put_u16(&mut buf, 0xBEEF);
        assert_eq!(get_u16(&buf), Some(0xBEEF));

        let named = [0x03, b'a', b'b', b'c', 0x00];
        assert_eq!(get_str(&named), Some(&b"abc"[..]));
        assert_eq!(get_str(&named[..2]), None);
    }
}
