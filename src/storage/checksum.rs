/// Order-dependent rolling checksum over an image body
///
/// Each byte is added to the accumulator, which is then rotated left by one
/// bit. Detects torn writes and bit rot; it is not a MAC.
pub fn image_checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)).rotate_left(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(image_checksum(&[]), 0);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(image_checksum(&[1]), 2);
        // ((0 + 1) rotl 1 + 2) rotl 1 = (2 + 2) rotl 1 = 8
        assert_eq!(image_checksum(&[1, 2]), 8);
    }

    #[test]
    fn test_order_dependent() {
        assert_ne!(image_checksum(&[1, 2, 3]), image_checksum(&[3, 2, 1]));
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let original = vec![0xA5u8; 41 * 200];
        let mut flipped = original.clone();
        flipped[4000] ^= 0x01;
        assert_ne!(image_checksum(&original), image_checksum(&flipped));
    }

    #[test]
    fn test_high_bits_wrap_around() {
        let bytes = [0xFFu8; 64];
        // Must not panic on overflow and must stay deterministic
        assert_eq!(image_checksum(&bytes), image_checksum(&bytes));
    }
}
