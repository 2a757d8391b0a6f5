//! Bit-field helpers for the packed legacy instruction words.

/// `width` bits of `word` starting at bit `lo`.
pub(crate) fn bit_select(word: u32, lo: u32, width: u32) -> u32 {
    debug_assert!(lo + width <= 32);
    (word >> lo) & ((1u32 << width) - 1)
}

/// Nibble `index` of a packed 16-nibble map.
pub(crate) fn get4(map: u64, index: u32) -> u32 {
    ((map >> ((index & 15) * 4)) & 0xF) as u32
}

/// Replace nibble `index` of a packed 16-nibble map.
pub(crate) fn set4(map: u64, index: u32, value: u32) -> u64 {
    let shift = (index & 15) * 4;
    (map & !(0xFu64 << shift)) | (u64::from(value & 0xF) << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_select_extracts_fields() {
        assert_eq!(bit_select(0xABCD_1234, 0, 16), 0x1234);
        assert_eq!(bit_select(0xABCD_1234, 16, 16), 0xABCD);
        assert_eq!(bit_select(0x0000_0040, 6, 3), 1);
    }

    #[test]
    fn nibble_map_round_trips() {
        let mut map = 0u64;
        map = set4(map, 0, 0x7);
        map = set4(map, 15, 0xE);
        assert_eq!(get4(map, 0), 0x7);
        assert_eq!(get4(map, 15), 0xE);
        map = set4(map, 0, 0x1);
        assert_eq!(get4(map, 0), 0x1);
        assert_eq!(get4(map, 15), 0xE);
    }
}
