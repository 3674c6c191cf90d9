use crate::error::ValidationError;

/// Length of a textual address: `0x` followed by 40 hex digits
pub const ADDRESS_LENGTH: usize = 42;

/// Check the exact lexical form `0x` + 40 hex digits (either case)
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LENGTH
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate an address and return its canonical lowercase form
pub fn validate_address(address: &str) -> Result<String, ValidationError> {
    if !is_valid_address(address) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }
    Ok(address.to_ascii_lowercase())
}

/// Canonical form used for every subscription lookup.
///
/// Addresses compare case-insensitively; the lowercase spelling is the
/// one stored and the one carried in a transaction's subscriber tag.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}
