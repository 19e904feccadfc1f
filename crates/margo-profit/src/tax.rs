//! Tax-inclusive price adjustment

/// Multiplier turning a tax-exclusive amount into a tax-inclusive one for
/// the given tax id. Ids 5 and 2 are zero-rated, 7 and 6 carry 11% VAT;
/// anything else is treated as untaxed.
pub fn tax_multiplier(tax_id: i64) -> f64 {
    match tax_id {
        5 | 2 => 1.0,
        7 | 6 => 1.11,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::tax_multiplier;

    #[test]
    fn known_and_unknown_ids() {
        assert_eq!(tax_multiplier(5), 1.0);
        assert_eq!(tax_multiplier(2), 1.0);
        assert_eq!(tax_multiplier(7), 1.11);
        assert_eq!(tax_multiplier(6), 1.11);
        assert_eq!(tax_multiplier(99), 1.0);
    }
}
