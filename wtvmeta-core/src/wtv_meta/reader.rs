//! Low-level helpers for the WTV metadata record layout.

use std::io::{self, Read};

use bytes::Buf;

use crate::error::{Result, WtvError};

/// Boundary marker preceding every metadata record.
pub const RECORD_MARKER: [u8; 16] = [
    0x5A, 0xFE, 0xD7, 0x6D, 0xC8, 0x1D, 0x8F, 0x4A, 0x99, 0x22, 0xFA, 0xB1, 0x1C, 0x38, 0x14, 0x53,
];

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Reads the next 16 bytes and compares them against [`RECORD_MARKER`].
///
/// Running out of input before 16 bytes counts as a mismatch, not an error.
pub fn read_marker<R: Read>(reader: &mut R) -> io::Result<bool> {
    let mut buf = [0u8; RECORD_MARKER.len()];
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(buf == RECORD_MARKER)
}

pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads UTF-16LE code units up to (and consuming) a zero unit.
pub fn read_wide_cstr<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut units = Vec::new();
    loop {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        let unit = u16::from_le_bytes(buf);
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// In-memory counterpart of [`read_wide_cstr`].
pub fn get_wide_cstr<B: Buf>(buf: &mut B) -> Result<String> {
    let mut units = Vec::new();
    loop {
        if buf.remaining() < 2 {
            return Err(WtvError::Unterminated);
        }
        let unit = buf.get_u16_le();
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Decodes a UTF-16LE payload, dropping one trailing NUL unit if present.
/// A dangling odd byte is ignored.
pub fn decode_wide_payload(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}

/// Lowercase hex, two digits per byte.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn matches_record_marker() {
        let mut cursor = Cursor::new(RECORD_MARKER.to_vec());
        assert!(read_marker(&mut cursor).expect("marker"));
        assert_eq!(cursor.position(), 16);
    }

    #[test]
    fn rejects_wrong_marker() {
        let mut bytes = RECORD_MARKER;
        bytes[15] ^= 0xFF;
        let mut cursor = Cursor::new(bytes.to_vec());
        assert!(!read_marker(&mut cursor).expect("marker"));
    }

    #[test]
    fn short_marker_is_a_mismatch() {
        let mut cursor = Cursor::new(RECORD_MARKER[..10].to_vec());
        assert!(!read_marker(&mut cursor).expect("marker"));

        let mut empty = Cursor::new(Vec::new());
        assert!(!read_marker(&mut empty).expect("marker"));
    }

    #[test]
    fn reads_wide_cstr_and_stops_at_terminator() {
        let data = b"T\0i\0t\0l\0e\0\0\0\xAA";
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(read_wide_cstr(&mut cursor).expect("name"), "Title");
        assert_eq!(cursor.position(), 12);
    }

    #[test]
    fn wide_cstr_without_terminator_is_eof() {
        let mut cursor = Cursor::new(&b"A\0B\0"[..]);
        let err = read_wide_cstr(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn gets_wide_cstr_from_buf() {
        let mut data = &b"i\0m\0a\0g\0e\0/\0p\0n\0g\0\0\0rest"[..];
        assert_eq!(get_wide_cstr(&mut data).expect("mime"), "image/png");
        assert_eq!(data, b"rest");
    }

    #[test]
    fn buf_wide_cstr_without_terminator_fails() {
        let mut data = &b"x\0y"[..];
        assert!(matches!(get_wide_cstr(&mut data), Err(WtvError::Unterminated)));
    }

    #[test]
    fn decodes_payload_with_and_without_nul() {
        assert_eq!(decode_wide_payload(b"H\0i\0\0\0"), "Hi");
        assert_eq!(decode_wide_payload(b"H\0i\0"), "Hi");
        assert_eq!(decode_wide_payload(b""), "");
        assert_eq!(decode_wide_payload(b"\xE9\0"), "\u{e9}");
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(bytes_to_hex(&[0x00, 0x0F, 0xA0, 0xFF]), "000fa0ff");
        assert_eq!(bytes_to_hex(&[]), "");
    }
}
