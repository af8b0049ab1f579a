//! Product types shared by the importer and the server

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalized product ready to be written to the catalog.
///
/// `sku` is always the canonical identity: trimmed and lowercased. Two records
/// with the same `sku` describe the same catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub sku: String,
    pub name: String,
    pub description: String,
    /// Never negative. `None` when the source value was missing or unusable.
    pub price: Option<Decimal>,
    pub is_active: bool,
}

impl ProductRecord {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            description: String::new(),
            price: None,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_price(mut self, price: Option<Decimal>) -> Self {
        self.price = price;
        self
    }
}

/// A product as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Build a fresh stored product from a normalized record.
    pub fn from_record(record: &ProductRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sku: record.sku.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            price: record.price,
            is_active: record.is_active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the mutable fields with those of `record`, keeping identity.
    pub fn apply(&mut self, record: &ProductRecord) {
        self.name = record.name.clone();
        self.description = record.description.clone();
        self.price = record.price;
        self.is_active = record.is_active;
        self.updated_at = Utc::now();
    }

    pub fn matches(&self, record: &ProductRecord) -> bool {
        self.sku == record.sku
            && self.name == record.name
            && self.description == record.description
            && self.price == record.price
            && self.is_active == record.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_apply_keeps_identity() {
        let first = ProductRecord::new("sku-001", "Widget");
        let mut product = Product::from_record(&first);
        let id = product.id;
        let created_at = product.created_at;

        let second = ProductRecord::new("sku-001", "Widget v2")
            .with_description("Improved")
            .with_price(Decimal::from_str("9.99").ok());
        product.apply(&second);

        assert_eq!(product.id, id);
        assert_eq!(product.created_at, created_at);
        assert!(product.matches(&second));
        assert!(!product.matches(&first));
    }

    #[test]
    fn test_price_serializes_as_string() {
        let record = ProductRecord::new("a", "A").with_price(Decimal::from_str("12.50").ok());
        let json = serde_json::to_value(&record).unwrap_or_default();
        assert_eq!(json["price"], "12.50");
        assert_eq!(json["is_active"], true);
    }
}
