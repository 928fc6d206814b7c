// bot/src/utils.rs

// --- Imports ---
use crate::error::{BotError, BotResult};
use ethers::types::U256;
use ethers::utils::format_units as ethers_format_units;
use serde::{Deserialize, Deserializer};

/// Decimals of the chain's native display unit (wei -> ether).
pub const NATIVE_DECIMALS: i32 = 18;

// --- Hex Quantity Helpers ---

/// Decodes a JSON-RPC hex quantity into a `U256`.
///
/// Accepts `0x`-prefixed or bare hex. Odd-length input is left-padded with a
/// single zero nibble before byte decoding, so `0x1` and `0x01` are equal.
pub fn hex_to_u256(s: &str) -> BotResult<U256> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(BotError::Encoding(format!("empty hex quantity '{}'", s)));
    }
    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    let bytes = hex::decode(&padded)
        .map_err(|e| BotError::Encoding(format!("invalid hex quantity '{}': {}", s, e)))?;
    if bytes.len() > 32 {
        return Err(BotError::Encoding(format!(
            "hex quantity '{}' does not fit in 256 bits",
            s
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

/// Encodes a `U256` as a JSON-RPC quantity: `0x` followed by the shortest
/// hex form (`0x0` for zero).
pub fn u256_to_hex(value: U256) -> String {
    format!("0x{:x}", value)
}

/// serde adapter for required quantity fields.
pub fn de_quantity<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    hex_to_u256(&raw).map_err(serde::de::Error::custom)
}

/// serde adapter for quantity fields the node may report as `null`.
pub fn de_opt_quantity<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => hex_to_u256(&raw).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

// --- Conversion Helpers ---

/// Trait for lossy conversion to f64.
pub trait ToF64Lossy {
    fn to_f64_lossy(&self) -> f64;
}

/// Lossy conversion of U256 to f64, word by word from the most significant.
impl ToF64Lossy for U256 {
    fn to_f64_lossy(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        let mut val = 0.0;
        if self.0[3] > 0 {
            val += (self.0[3] as f64) * (2.0_f64.powi(192));
        }
        if self.0[2] > 0 {
            val += (self.0[2] as f64) * (2.0_f64.powi(128));
        }
        if self.0[1] > 0 {
            val += (self.0[1] as f64) * (2.0_f64.powi(64));
        }
        val += self.0[0] as f64;
        val
    }
}

/// Transaction fee in the chain's display unit: `gas_used * gas_price / 1e18`.
pub fn fee_in_native(gas_used: U256, gas_price: U256) -> f64 {
    gas_used.saturating_mul(gas_price).to_f64_lossy() / 10_f64.powi(NATIVE_DECIMALS)
}

pub fn format_units(value: U256, decimals: i32) -> eyre::Result<String> {
    ethers_format_units(value, decimals).map_err(|e| eyre::eyre!("Failed to format units: {}", e))
}
