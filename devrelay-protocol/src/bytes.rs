//! Little-endian field helpers shared by the request and response codecs.

use std::fmt::Write;

/// 16-bit little-endian field at `offset`, or `None` if the slice ends first
pub fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    match data.get(offset..offset.checked_add(2)?)? {
        &[lo, hi] => Some(u16::from_le_bytes([lo, hi])),
        _ => None,
    }
}

/// 24-bit little-endian field at `offset` (block numbers, peer addresses)
pub fn read_u24_le(data: &[u8], offset: usize) -> Option<u32> {
    match data.get(offset..offset.checked_add(3)?)? {
        &[lo, mid, hi] => Some(u32::from_le_bytes([lo, mid, hi, 0])),
        _ => None,
    }
}

pub fn write_u16_le(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Low 24 bits of `value`; the top byte is dropped
pub fn write_u24_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Space separated upper-case hex, for trace output
pub fn fmt_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fields() {
        let data = [0xFF, 0x12, 0x34, 0x56];
        assert_eq!(read_u16_le(&data, 1), Some(0x3412));
        assert_eq!(read_u24_le(&data, 1), Some(0x563412));
    }

    #[test]
    fn test_short_reads_are_none() {
        assert_eq!(read_u16_le(&[0x01], 0), None);
        assert_eq!(read_u24_le(&[0x01, 0x02, 0x03], 1), None);
        assert_eq!(read_u24_le(&[], usize::MAX), None);
    }

    #[test]
    fn test_write_u24_le_truncates() {
        let mut out = Vec::new();
        write_u24_le(&mut out, 0xFF_01_02_03);
        write_u16_le(&mut out, 0xBEEF);
        assert_eq!(out, vec![0x03, 0x02, 0x01, 0xEF, 0xBE]);
    }

    #[test]
    fn test_fmt_hex() {
        assert_eq!(fmt_hex(&[0x00, 0xC0, 0x0A]), "00 C0 0A");
        assert_eq!(fmt_hex(&[]), "");
    }
}
