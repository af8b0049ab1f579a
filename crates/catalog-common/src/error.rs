//! Error types shared across the catalog crates

use thiserror::Error;

/// Error for values shared types refuse to parse
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

impl CatalogError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = CatalogError::invalid("status", "paused");
        assert_eq!(err.to_string(), "Invalid status: paused");
    }
}
