//! Big-endian scalar readers for the fixed-width value elements.

pub fn get_u16_be(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

pub fn get_u32_be(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Dotted rendering of a raw address candidate for the diagnostic log.
pub fn format_address(candidate: &[u8]) -> String {
    candidate
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
