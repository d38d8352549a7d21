//! IPv4 header checksum.

use crate::IPV4_HEADER_LEN;

/// Byte offset of the checksum field inside the IPv4 header.
pub const IPV4_CHECKSUM_OFFSET: usize = 10;

/// Folds carries back into the low 16 bits and complements.
#[inline(always)]
pub const fn fold(sum: u32) -> u16 {
    // ten 16-bit words never need more than two folds
    let sum = (sum & 0xffff) + (sum >> 16);
    let sum = (sum & 0xffff) + (sum >> 16);
    !(sum as u16)
}

/// Checksum over the 10 header words with the checksum field taken as zero.
///
/// The result is in host order; store it big-endian.
#[inline(always)]
pub fn ipv4_header_checksum(header: &[u8; IPV4_HEADER_LEN]) -> u16 {
    let mut sum = 0u32;
    let mut i = 0;
    while i < IPV4_HEADER_LEN {
        if i != IPV4_CHECKSUM_OFFSET {
            sum += u16::from_be_bytes([header[i], header[i + 1]]) as u32;
        }
        i += 2;
    }
    fold(sum)
}

/// True when the stored checksum matches the header contents.
pub fn ipv4_header_valid(header: &[u8; IPV4_HEADER_LEN]) -> bool {
    let stored = u16::from_be_bytes([header[IPV4_CHECKSUM_OFFSET], header[IPV4_CHECKSUM_OFFSET + 1]]);
    stored == ipv4_header_checksum(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 192.168.0.1 -> 192.168.0.199, UDP, total length 115
    const VECTOR_A: [u8; 20] = [
        0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8, 0x00,
        0x01, 0xc0, 0xa8, 0x00, 0xc7,
    ];

    // 172.16.10.99 -> 172.16.10.12, TCP, total length 60
    const VECTOR_B: [u8; 20] = [
        0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06, 0xb1, 0xe6, 0xac, 0x10, 0x0a,
        0x63, 0xac, 0x10, 0x0a, 0x0c,
    ];

    #[test]
    fn known_vectors() {
        assert_eq!(ipv4_header_checksum(&VECTOR_A), 0xb861);
        assert_eq!(ipv4_header_checksum(&VECTOR_B), 0xb1e6);
        assert!(ipv4_header_valid(&VECTOR_A));
        assert!(ipv4_header_valid(&VECTOR_B));
    }

    #[test]
    fn checksum_field_is_ignored() {
        let mut header = VECTOR_A;
        header[10] = 0xde;
        header[11] = 0xad;
        assert_eq!(ipv4_header_checksum(&header), 0xb861);
        assert!(!ipv4_header_valid(&header));
    }

    #[test]
    fn fold_handles_double_carry() {
        // 0x1_fffe folds to 0xffff, which must not carry again
        assert_eq!(fold(0x1_fffe), 0x0000);
        // 0x2_ffff folds to 0x1_0001, second fold gives 0x0002
        assert_eq!(fold(0x2_ffff), !0x0002);
    }
}
