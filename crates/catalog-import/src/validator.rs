//! Row validation and normalization
//!
//! A missing SKU fails a row and an overlong SKU skips it. Every other defect
//! is repaired: a blank name falls back to the SKU, an overlong name is cut at
//! [`MAX_NAME_CHARS`] and an unusable price becomes null.

use crate::parser::RawRow;
use catalog_common::types::ProductRecord;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;

/// Largest price a `NUMERIC(10,2)` column can hold (9_999_999_999 hundredths).
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

pub const MAX_SKU_CHARS: usize = 100;
pub const MAX_NAME_CHARS: usize = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    /// Counted as a failed row.
    #[error("missing SKU")]
    MissingSku,

    /// Counted as a skipped row.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Canonical identity form of a SKU.
pub fn normalize_sku(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parse a price, returning `None` for anything that is not a usable
/// non-negative amount. Accepted values carry exactly two decimal places.
pub fn normalize_price(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    // Decimal::from_str takes digit separators ("1_000").
    if raw.is_empty() || raw.contains('_') {
        return None;
    }

    let parsed = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()?;
    if parsed < Decimal::ZERO {
        return None;
    }

    let mut value = parsed.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if value > MAX_PRICE {
        return None;
    }
    if value.is_zero() {
        // drops the sign of "-0"
        value = Decimal::ZERO;
    }
    value.rescale(2);
    Some(value)
}

pub fn normalize(row: &RawRow) -> Result<ProductRecord, RowRejection> {
    let sku = normalize_sku(&row.sku);
    if sku.is_empty() {
        return Err(RowRejection::MissingSku);
    }
    if sku.chars().count() > MAX_SKU_CHARS {
        return Err(RowRejection::Rejected(format!(
            "SKU longer than {} characters",
            MAX_SKU_CHARS
        )));
    }

    let name = match row.name.trim() {
        "" => sku.clone(),
        name => name.chars().take(MAX_NAME_CHARS).collect::<String>().trim_end().to_string(),
    };

    Ok(ProductRecord {
        name,
        description: row.description.trim().to_string(),
        price: normalize_price(&row.price),
        is_active: true,
        sku,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(sku: &str, name: &str, description: &str, price: &str) -> RawRow {
        RawRow {
            row_number: 1,
            sku: sku.into(),
            name: name.into(),
            description: description.into(),
            price: price.into(),
        }
    }

    fn price(s: &str) -> Option<Decimal> {
        Some(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_sku_is_trimmed_and_lowercased() {
        let record = normalize(&row("  SKU-001 ", "Widget", "", "")).unwrap();
        assert_eq!(record.sku, "sku-001");
        assert!(record.is_active);
    }

    #[test]
    fn test_blank_sku_is_missing() {
        assert_eq!(normalize(&row("", "Widget", "", "1")), Err(RowRejection::MissingSku));
        assert_eq!(normalize(&row(" \t ", "Widget", "", "1")), Err(RowRejection::MissingSku));
    }

    #[test]
    fn test_blank_name_falls_back_to_sku() {
        let record = normalize(&row("ABC", "   ", "", "")).unwrap();
        assert_eq!(record.name, "abc");
    }

    #[test]
    fn test_overlong_sku_is_rejected() {
        let sku = "x".repeat(MAX_SKU_CHARS + 1);
        assert!(matches!(
            normalize(&row(&sku, "Widget", "", "")),
            Err(RowRejection::Rejected(_))
        ));
        assert!(normalize(&row(&"x".repeat(MAX_SKU_CHARS), "Widget", "", "")).is_ok());
    }

    #[test]
    fn test_overlong_name_is_truncated() {
        let record = normalize(&row("a", &"é".repeat(300), "", "")).unwrap();
        assert_eq!(record.name.chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_name_and_description_are_trimmed() {
        let record = normalize(&row("a", "  Widget  ", "  Blue one \n", "")).unwrap();
        assert_eq!(record.name, "Widget");
        assert_eq!(record.description, "Blue one");
    }

    #[test]
    fn test_price_normalization() {
        assert_eq!(normalize_price("9.99"), price("9.99"));
        assert_eq!(normalize_price(" 10 "), price("10.00"));
        assert_eq!(normalize_price("1.005"), price("1.01"));
        assert_eq!(normalize_price("-0").unwrap().to_string(), "0.00");
        assert_eq!(normalize_price("0"), price("0.00"));
        assert_eq!(normalize_price("1e2"), price("100.00"));
        assert_eq!(normalize_price("99999999.99"), price("99999999.99"));

        assert_eq!(normalize_price(""), None);
        assert_eq!(normalize_price("-5"), None);
        assert_eq!(normalize_price("-0.004"), None);
        assert_eq!(normalize_price("abc"), None);
        assert_eq!(normalize_price("$5"), None);
        assert_eq!(normalize_price("1,000"), None);
        assert_eq!(normalize_price("1_000"), None);
        assert_eq!(normalize_price("1_0e2"), None);
        assert_eq!(normalize_price("100000000"), None);
    }

    #[test]
    fn test_bad_price_does_not_reject_row() {
        let record = normalize(&row("a", "A", "", "-12.50")).unwrap();
        assert_eq!(record.price, None);
        let record = normalize(&row("a", "A", "", "twelve")).unwrap();
        assert_eq!(record.price, None);
    }

    #[test]
    fn test_max_price_constant() {
        assert_eq!(MAX_PRICE, Decimal::from_str("99999999.99").unwrap());
    }

    proptest! {
        #[test]
        fn prop_normalized_sku_is_canonical(raw in "\\PC{0,24}") {
            let sku = normalize_sku(&raw);
            prop_assert_eq!(normalize_sku(&sku), sku.clone());
            prop_assert_eq!(sku.trim(), sku.as_str());
        }

        #[test]
        fn prop_price_is_never_negative(raw in "-?[0-9]{0,12}(\\.[0-9]{0,4})?") {
            if let Some(value) = normalize_price(&raw) {
                prop_assert!(value >= Decimal::ZERO);
                prop_assert!(value <= MAX_PRICE);
                prop_assert_eq!(value.scale(), 2);
            }
        }

        #[test]
        fn prop_non_empty_sku_always_yields_record(
            sku in "[A-Za-z0-9-]{1,16}",
            name in "\\PC{0,16}",
            price in "\\PC{0,8}",
        ) {
            let record = normalize(&row(&sku, &name, "", &price));
            prop_assert!(record.is_ok());
        }
    }
}
