pub mod address;
pub mod amount;
pub mod transaction;

pub use address::{is_valid_address, normalize_address, validate_address};
pub use amount::{ether_to_wei_hex, format_wei_as_ether, parse_quantity, wei_hex_to_ether};
pub use transaction::{Block, BlockNumber, Transaction};
