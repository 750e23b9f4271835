use bitfield::bitfield;

use super::{CardClass, BLOCK_SIZE};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum BusWidth {
    One = 0b00,
    Four = 0b10,
}

bitfield! {
    #[derive(Copy, Clone)]
    pub struct CSDv1(u128);
    pub version, _: 127, 126;
    pub max_read_data_block_length, _: 83, 80;
    pub device_size, _: 73, 62;
    pub device_size_multiplier, _: 49, 47;
}

impl CSDv1 {
    /// None for a reserved read block length, only 512, 1024 and 2048 are defined
    pub fn num_blocks(&self) -> Option<u32> {
        let exponent = self.max_read_data_block_length() as u32;
        if !(9..=11).contains(&exponent) {
            return None;
        }
        let blocks = (self.device_size() as u64 + 1) << (self.device_size_multiplier() + 2);
        let bytes = blocks << exponent;
        u32::try_from(bytes / BLOCK_SIZE as u64).ok()
    }
}

bitfield! {
    #[derive(Copy, Clone)]
    pub struct CSDv2(u128);
    pub device_size, _: 69, 48;
}

impl CSDv2 {
    pub fn num_blocks(&self) -> Option<u32> {
        u32::try_from((self.device_size() as u64 + 1) * 1024).ok()
    }
}

pub fn csd_value(words: [u32; 4]) -> u128 {
    words.iter().fold(0u128, |value, &word| value << 32 | word as u128)
}

/// Capacity in 512-byte blocks, `words` most significant first.
///
/// The layout is chosen by card class rather than by the CSD structure field,
/// an unresolved class decodes to zero. None when the count does not fit in
/// 32 bits or the descriptor carries a reserved value.
pub fn decode_blocks(class: CardClass, words: [u32; 4]) -> Option<u32> {
    let value = csd_value(words);
    match class {
        CardClass::SDHC => CSDv2(value).num_blocks(),
        CardClass::SDSC => CSDv1(value).num_blocks(),
        _ => Some(0),
    }
}

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct CID(u128);
    impl Debug;
    pub u8, manufacturer_id, _: 127, 120;
    pub u16, oem_id, _: 119, 104;
    pub u64, product_name_raw, _: 103, 64;
    pub u8, product_revision, _: 63, 56;
    pub u32, serial_number, _: 55, 24;
    pub u16, manufacture_year_offset, _: 19, 12;
    pub u8, manufacture_month, _: 11, 8;
}

impl CID {
    pub fn product_name(&self) -> [u8; 5] {
        let bytes = self.product_name_raw().to_be_bytes();
        [bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
    }

    pub fn manufacture_year(&self) -> u16 {
        2000 + self.manufacture_year_offset()
    }
}
