use primitive_types::U256;

use crate::error::ValidationError;

/// Number of wei in one ether
const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Fractional digits shown when rendering ether amounts
pub const DISPLAY_DECIMALS: u32 = 8;

/// Parse a `0x`-prefixed hexadecimal quantity into a 256-bit integer
pub fn parse_quantity(hex: &str) -> Result<U256, ValidationError> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .ok_or_else(|| ValidationError::InvalidAmount(hex.to_string()))?;

    if digits.is_empty() || digits.len() > 64 {
        return Err(ValidationError::InvalidAmount(hex.to_string()));
    }

    U256::from_str_radix(digits, 16).map_err(|_| ValidationError::InvalidAmount(hex.to_string()))
}

/// Render a wei amount as ether with eight fractional digits.
///
/// The division is exact integer arithmetic; the last shown digit is
/// rounded half-to-even, so no 256-bit amount loses precision above the
/// display resolution.
pub fn format_wei_as_ether(wei: U256) -> String {
    let shift = U256::from(10u64).pow(U256::from(18 - DISPLAY_DECIMALS));
    let mut scaled = wei / shift;
    let remainder = wei % shift;

    let half = shift / 2;
    if remainder > half || (remainder == half && scaled.bit(0)) {
        scaled += U256::one();
    }

    let unit = U256::from(10u64).pow(U256::from(DISPLAY_DECIMALS));
    let whole = scaled / unit;
    let fraction = (scaled % unit).low_u64();

    format!("{}.{:0width$}", whole, fraction, width = DISPLAY_DECIMALS as usize)
}

/// Convert a hexadecimal wei quantity to its ether display string
pub fn wei_hex_to_ether(hex: &str) -> Result<String, ValidationError> {
    parse_quantity(hex).map(format_wei_as_ether)
}

/// Encode an integer ether amount as a hexadecimal wei quantity
pub fn ether_to_wei_hex(ether: u64) -> String {
    let wei = U256::from(ether) * U256::from(WEI_PER_ETHER);
    format!("{:#x}", wei)
}
