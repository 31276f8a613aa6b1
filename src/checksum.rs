//! CRC-16 frame check sequence shared by every framed transport.
//!
//! Inverted 16-bit ones'-complement of the 16-bit little-endian words of
//! the input, implicitly zero-padded to an even length.

/// Compute the frame check sequence over `data`.
///
/// Pure function of its input: no allocation, no failure modes. A single
/// flipped bit anywhere in `data` changes the result (the accumulator sums
/// every byte position with a distinct weight, and the final complement is
/// injective over the sum).
pub fn crc16(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    for (index, &byte) in data.iter().enumerate() {
        if index % 2 == 0 {
            sum = sum.wrapping_add(byte as u16);
        } else {
            sum = sum.wrapping_add((byte as u16) << 8);
        }
    }
    !sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_all_ones() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn single_bit_flip_changes_result() {
        let base = [0x01, 0x02, 0x03, 0x04, 0x05];
        let base_crc = crc16(&base);
        for byte_index in 0..base.len() {
            for bit in 0..8u8 {
                let mut flipped = base;
                flipped[byte_index] ^= 1 << bit;
                assert_ne!(
                    crc16(&flipped),
                    base_crc,
                    "flipping bit {bit} of byte {byte_index} did not change the checksum"
                );
            }
        }
    }

    #[test]
    fn get_client_info_frame_checksum() {
        // Get-client-info command packet 0x80 0x01 -> FCS 0x7F 0xFE.
        let fcs = crc16(&[0x80, 0x01]);
        assert_eq!(fcs.to_le_bytes(), [0x7F, 0xFE]);
    }

    #[test]
    fn odd_length_is_zero_padded() {
        // A trailing odd byte is weighted as the low byte of a word whose
        // high byte is the implicit zero pad.
        let odd = crc16(&[0xAB]);
        let padded = crc16(&[0xAB, 0x00]);
        assert_eq!(odd, padded);
    }
}
