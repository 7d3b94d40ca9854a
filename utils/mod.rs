//! Utility functions
//!
//! Logging backend and small helpers shared by the core and the
//! architecture code.

pub mod log;

/// Mask for the low `bits` bits of a register field
#[macro_export]
macro_rules! field_mask {
    ($bits:expr) => {
        ((1u32 << $bits) - 1)
    };
}

/// Extract `bits` bits starting at `shift` from `value`
#[inline]
pub const fn extract_field(value: u32, shift: u32, bits: u32) -> u32 {
    (value >> shift) & field_mask!(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field() {
        assert_eq!(extract_field(0x1d3, 0, 5), 0x13);
        assert_eq!(extract_field(0x1d3, 6, 3), 0b111);
        assert_eq!(extract_field(0xF000_0000, 28, 4), 0xF);
    }
}
