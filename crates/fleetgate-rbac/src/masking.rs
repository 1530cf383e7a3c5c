//! Field-level masking and row projection.
//!
//! Masking is format-preserving partial redaction: a value of `N` characters
//! keeps its first and last two characters when `N > 4`, with the `N - 4`
//! interior characters replaced by `*`. Values of four characters or fewer
//! are replaced entirely. Lengths count Unicode scalar values.
//!
//! | Input            | Output           |
//! |------------------|------------------|
//! | `"0917-555-0101"`| `"09*********01"`|
//! | `"ABCD"`         | `"****"`         |
//! | `1250000`        | `"12***00"`      |
//! | `null`           | `null`           |
//!
//! ## Examples
//!
//! ```
//! use fleetgate_rbac::masking::mask_text;
//!
//! assert_eq!(mask_text("JS123456"), "JS****56");
//! assert_eq!(mask_text("abc"), "***");
//! ```

use std::collections::BTreeSet;

use fleetgate_types::{PiiScope, Role};
use serde_json::{Map, Value};

use crate::fields::{FieldCategory, FINANCIAL_FIELDS, IDENTIFIER_FIELDS, PII_FIELDS};

/// Replacement character for masked positions.
pub const MASK_CHAR: char = '*';

/// Characters kept at each end of a masked value.
const VISIBLE_AFFIX: usize = 2;

// ---------------------------------------------------------------------------
// Core masking functions
// ---------------------------------------------------------------------------

/// Masks a string value.
pub fn mask_text(text: &str) -> String {
    let len = text.chars().count();

    if len <= VISIBLE_AFFIX * 2 {
        return MASK_CHAR.to_string().repeat(len);
    }

    let mut masked = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        if i < VISIBLE_AFFIX || i >= len - VISIBLE_AFFIX {
            masked.push(c);
        } else {
            masked.push(MASK_CHAR);
        }
    }

    debug_assert_eq!(masked.chars().count(), len, "masking must preserve length");
    masked
}

/// Masks a JSON value.
///
/// Strings are masked directly. Numbers and booleans are masked on their
/// canonical string form and become strings. `null` is left as is. Arrays
/// and objects are masked element by element.
pub fn mask_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(mask_text(s)),
        Value::Number(n) => Value::String(mask_text(&n.to_string())),
        Value::Bool(b) => Value::String(mask_text(&b.to_string())),
        Value::Array(items) => Value::Array(items.iter().map(mask_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), mask_value(v)))
                .collect(),
        ),
    }
}

/// Returns `value` masked when `is_masked`, unchanged otherwise.
pub fn apply(value: &Value, is_masked: bool) -> Value {
    if is_masked {
        mask_value(value)
    } else {
        value.clone()
    }
}

// ---------------------------------------------------------------------------
// Field sets
// ---------------------------------------------------------------------------

fn to_owned_set(fields: &[&str]) -> impl Iterator<Item = String> {
    fields.iter().map(|f| (*f).to_string())
}

/// Returns the fields masked in a decision for this PII scope and role.
///
/// - `masked` PII scope masks PII fields
/// - support, analyst and risk investigator roles mask financial fields
/// - support additionally masks vehicle identifiers
pub fn masked_fields_for(pii_scope: PiiScope, role: Role) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();

    if pii_scope == PiiScope::Masked {
        fields.extend(to_owned_set(PII_FIELDS));
    }

    if matches!(role, Role::Support | Role::Analyst | Role::RiskInvestigator) {
        fields.extend(to_owned_set(FINANCIAL_FIELDS));
    }

    if role == Role::Support {
        fields.extend(to_owned_set(IDENTIFIER_FIELDS));
    }

    fields
}

/// Returns the fields stripped from bulk results for this PII scope and role.
pub fn forbidden_fields_for(pii_scope: PiiScope, role: Role) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();

    if pii_scope == PiiScope::None {
        fields.extend(to_owned_set(PII_FIELDS));
    }

    if matches!(role, Role::GroundOps | Role::Driver | Role::Operator) {
        fields.extend(to_owned_set(FINANCIAL_FIELDS));
    }

    fields
}

// ---------------------------------------------------------------------------
// FieldProjector
// ---------------------------------------------------------------------------

/// Applies forbidden and masked field sets to outbound rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldProjector {
    masked: BTreeSet<String>,
    forbidden: BTreeSet<String>,
}

impl FieldProjector {
    /// Creates a projector from explicit field sets.
    ///
    /// A field in both sets is forbidden.
    pub fn new(masked: BTreeSet<String>, forbidden: BTreeSet<String>) -> Self {
        let masked = masked.difference(&forbidden).cloned().collect();
        Self { masked, forbidden }
    }

    /// Creates a projector for a principal's PII scope and role.
    pub fn for_principal(pii_scope: PiiScope, role: Role) -> Self {
        Self::new(
            masked_fields_for(pii_scope, role),
            forbidden_fields_for(pii_scope, role),
        )
    }

    /// Creates a projector that only masks, as carried by a [`Decision`].
    ///
    /// [`Decision`]: fleetgate_types::Decision
    pub fn masking_only(masked: &BTreeSet<String>) -> Self {
        Self::new(masked.clone(), BTreeSet::new())
    }

    pub fn masked(&self) -> &BTreeSet<String> {
        &self.masked
    }

    pub fn forbidden(&self) -> &BTreeSet<String> {
        &self.forbidden
    }

    /// Returns whether `field` is masked.
    pub fn is_masked(&self, field: &str) -> bool {
        self.masked.contains(field)
    }

    /// Projects a single row: forbidden fields are removed, masked fields
    /// are redacted, everything else passes through.
    pub fn project_row(&self, row: &Map<String, Value>) -> Map<String, Value> {
        let projected: Map<String, Value> = row
            .iter()
            .filter(|(field, _)| !self.forbidden.contains(field.as_str()))
            .map(|(field, value)| (field.clone(), apply(value, self.is_masked(field))))
            .collect();

        debug_assert!(
            projected.keys().all(|k| !self.forbidden.contains(k.as_str())),
            "projected row must not carry forbidden fields"
        );
        projected
    }

    /// Projects every row.
    pub fn project_rows(&self, rows: &[Map<String, Value>]) -> Vec<Map<String, Value>> {
        rows.iter().map(|row| self.project_row(row)).collect()
    }

    /// Returns the catalogued categories this projector touches.
    pub fn categories(&self) -> BTreeSet<&'static str> {
        self.masked
            .iter()
            .chain(self.forbidden.iter())
            .filter_map(|field| FieldCategory::of(field))
            .map(|category| match category {
                FieldCategory::Pii => "pii",
                FieldCategory::Financial => "financial",
                FieldCategory::Identifier => "identifier",
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
