use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::amount::wei_hex_to_ether;

/// Chain height as reported by the node: a `0x`-prefixed hex string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(pub String);

impl BlockNumber {
    pub fn from_height(height: u64) -> Self {
        Self(format!("0x{:x}", height))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_u64(&self) -> Result<u64, ValidationError> {
        let digits = self
            .0
            .strip_prefix("0x")
            .ok_or_else(|| ValidationError::InvalidBlockNumber(self.0.clone()))?;
        u64::from_str_radix(digits, 16).map_err(|_| ValidationError::InvalidBlockNumber(self.0.clone()))
    }
}

/// Block body as returned by `eth_getBlockByNumber` with full transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Block {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub base_fee_per_gas: Option<String>,
    pub transactions: Vec<Transaction>,
}

/// A ledger transaction.
///
/// Gas, nonce and signature fields are carried verbatim. `subscriber` is
/// not part of the node's payload; it records which subscribed address the
/// transaction was attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transaction {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subscriber: String,
    pub hash: String,
    pub block_hash: String,
    pub block_number: String,
    pub transaction_index: String,
    pub from: String,
    /// `None` for contract creations
    pub to: Option<String>,
    pub value: String,
    pub gas: String,
    pub gas_price: String,
    pub nonce: String,
    pub input: String,
    pub v: String,
    pub r: String,
    pub s: String,
}

impl Transaction {
    /// Addresses in attribution order: sender first, then recipient
    pub fn counterparties(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.as_str()).chain(self.to.as_deref())
    }

    /// Transferred value in ether, eight fractional digits
    pub fn eth_amount(&self) -> Result<String, ValidationError> {
        wei_hex_to_ether(&self.value)
    }
}
