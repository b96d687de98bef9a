//! Low-level integer read and write utilities for byte slices.
//!
//! Widths are taken from the slice length (1 to 8 bytes).

/// Reads an unsigned integer spanning all of `data`.
pub fn read_uint(data: &[u8], little_endian: bool) -> u64 {
    let mut value = 0u64;

    if little_endian {
        for &byte in data.iter().rev() {
            value = (value << 8) | byte as u64;
        }
    } else {
        for &byte in data {
            value = (value << 8) | byte as u64;
        }
    }

    value
}

/// Writes the low `out.len()` bytes of `value` into `out`.
pub fn write_uint(out: &mut [u8], value: u64, little_endian: bool) {
    let width = out.len();

    for i in 0..width {
        let byte = (value >> (8 * i)) as u8;
        if little_endian {
            out[i] = byte;
        } else {
            out[width - 1 - i] = byte;
        }
    }
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Inclusive range of a signed integer `width` bytes wide.
pub fn signed_range(width: usize) -> (i128, i128) {
    let bits = (width * 8) as u32;
    let max = (1i128 << (bits - 1)) - 1;
    (-max - 1, max)
}

/// Largest unsigned integer `width` bytes wide.
pub fn unsigned_max(width: usize) -> u128 {
    (1u128 << (width * 8) as u32) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_uint() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_uint(&data, false), 0x01020304);
        assert_eq!(read_uint(&data, true), 0x04030201);
    }

    #[test]
    fn test_write_uint() {
        let mut out = [0u8; 4];
        write_uint(&mut out, 0x01020304, false);
        assert_eq!(out, [0x01, 0x02, 0x03, 0x04]);

        write_uint(&mut out, 0x01020304, true);
        assert_eq!(out, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_write_truncates_to_width() {
        let mut out = [0u8; 2];
        write_uint(&mut out, 0xAABBCCDD, false);
        assert_eq!(out, [0xCC, 0xDD]);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0x7FFF, 16), 0x7FFF);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_ranges() {
        assert_eq!(signed_range(1), (-128, 127));
        assert_eq!(signed_range(2), (-32768, 32767));
        assert_eq!(signed_range(8), (i64::MIN as i128, i64::MAX as i128));
        assert_eq!(unsigned_max(1), 255);
        assert_eq!(unsigned_max(4), u32::MAX as u128);
        assert_eq!(unsigned_max(8), u64::MAX as u128);
    }
}
