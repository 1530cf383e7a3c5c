//! Field catalog.
//!
//! Sensitive fields of fleet records, grouped by category. Fields outside the
//! catalog are never masked or forbidden.

use serde::{Deserialize, Serialize};

/// Personal data about drivers and owners.
pub const PII_FIELDS: &[&str] = &[
    "driver_name",
    "driver_phone",
    "driver_email",
    "driver_license_number",
    "owner_name",
    "owner_contact",
    "home_address",
];

/// Money and contract figures.
pub const FINANCIAL_FIELDS: &[&str] = &[
    "purchase_price",
    "lease_rate",
    "bank_account_number",
    "insurance_policy_number",
    "payout_amount",
];

/// Vehicle identifiers.
pub const IDENTIFIER_FIELDS: &[&str] = &["vin", "license_plate"];

/// Category of a sensitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    Pii,
    Financial,
    Identifier,
}

impl FieldCategory {
    /// Every category.
    pub const ALL: &'static [FieldCategory] = &[
        FieldCategory::Pii,
        FieldCategory::Financial,
        FieldCategory::Identifier,
    ];

    /// Returns the fields in this category.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            FieldCategory::Pii => PII_FIELDS,
            FieldCategory::Financial => FINANCIAL_FIELDS,
            FieldCategory::Identifier => IDENTIFIER_FIELDS,
        }
    }

    /// Returns the category of `field`, if it is in the catalog.
    pub fn of(field: &str) -> Option<FieldCategory> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.fields().contains(&field))
    }
}

/// Returns every catalogued field.
pub fn catalog() -> impl Iterator<Item = &'static str> {
    FieldCategory::ALL
        .iter()
        .flat_map(|category| category.fields().iter().copied())
}
