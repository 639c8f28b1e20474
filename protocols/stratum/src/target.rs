//! 256-bit share target arithmetic (§3 GLOSSARY: Target, Threshold).

use uint::construct_uint;

construct_uint! {
    /// Big-endian 256-bit unsigned integer used for both the share target
    /// and, transiently, for difficulty values received from upstream.
    pub struct U256(4);
}

impl U256 {
    /// `target = 2^256 / (difficulty * threshold_div)`, saturating to
    /// `U256::max_value()` if the denominator is zero (an upstream that reports
    /// zero difficulty effectively has no threshold).
    pub fn share_threshold(difficulty: u64, threshold_div: u64) -> Self {
        let denominator = U256::from(difficulty).saturating_mul(U256::from(threshold_div));
        if denominator.is_zero() {
            return U256::max_value();
        }
        U256::max_value() / denominator
    }

    /// 32-byte big-endian hex encoding without a `0x` prefix, as used in
    /// `mining.set.params.target`.
    pub fn to_be_hex(&self) -> String {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        hex::encode(bytes)
    }

    pub fn from_be_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        Ok(U256::from_big_endian(&bytes))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn share_threshold_matches_definition() {
        let target = U256::share_threshold(1000, 8);
        let expected = U256::max_value() / U256::from(8000u64);
        assert_eq!(target, expected);
    }

    #[test]
    fn zero_difficulty_saturates_to_max() {
        assert_eq!(U256::share_threshold(0, 8), U256::max_value());
    }

    #[test]
    fn hex_round_trips() {
        let target = U256::share_threshold(12345, 4);
        let hex_str = target.to_be_hex();
        assert_eq!(hex_str.len(), 64);
        assert_eq!(U256::from_be_hex(&hex_str).unwrap(), target);
    }
}
