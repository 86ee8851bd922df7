//! Fixed-point amount handling. Every on-chain and ledger amount carries
//! exactly 8 fractional digits; amounts travel as strings on the wire and in
//! the database, never as floats.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{Result, SdkError};

/// Fractional digits carried by every amount.
pub const SCALE: u32 = 8;

/// Parse an 8-decimal amount string. Rejects more than 8 fractional digits
/// rather than silently rounding.
pub fn parse_amount(s: &str) -> Result<Decimal> {
    let value = Decimal::from_str(s.trim())
        .map_err(|e| SdkError::InvalidInput(format!("invalid amount '{}': {}", s, e)))?;
    if value.scale() > SCALE {
        return Err(SdkError::InvalidInput(format!(
            "amount '{}' has more than {} fractional digits",
            s, SCALE
        )));
    }
    Ok(value)
}

/// Render an amount with exactly 8 fractional digits, e.g. `150.00000000`.
pub fn format_amount(value: Decimal) -> String {
    let mut fixed = value;
    fixed.rescale(SCALE);
    fixed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_and_formats_eight_decimals() {
        let value = parse_amount("150.00000000").unwrap();
        assert_eq!(value, dec!(150));
        assert_eq!(format_amount(value), "150.00000000");
        assert_eq!(format_amount(dec!(0.00000001)), "0.00000001");
        assert_eq!(format_amount(dec!(25)), "25.00000000");
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(parse_amount("1.000000001").is_err());
        assert!(parse_amount("not-a-number").is_err());
    }

    #[test]
    fn scale_does_not_affect_equality() {
        assert_eq!(parse_amount("150").unwrap(), parse_amount("150.00000000").unwrap());
    }
}
