//! Dynamic tracker field metadata.
//!
//! Tracker fields are discovered at runtime, never hard-coded. The
//! catalog maps human-readable aliases to canonical field specs and is
//! cached in the per-backend configuration until explicitly refreshed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Standard tracker field identifiers.
///
/// Everything else is a custom field with an opaque id.
pub const SYSTEM_FIELDS: &[&str] = &[
    "reporter",
    "assignee",
    "components",
    "labels",
    "security",
    "priority",
    "summary",
    "description",
];

/// Returns true for opaque custom-field ids.
pub fn is_custom_field_id(id: &str) -> bool {
    id.starts_with("customfield_")
}

/// Returns true for standard system fields.
pub fn is_system_field_id(id: &str) -> bool {
    SYSTEM_FIELDS.contains(&id)
}

/// Canonical description of one tracker field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Tracker-side field id (`summary`, `customfield_10010`, ...).
    pub id: String,

    /// Human-readable name reported by the tracker.
    pub display_name: String,

    /// Tracker-reported type (`string`, `array`, `option`, ...).
    pub field_type: String,

    /// Whether the tracker requires the field on create.
    #[serde(default)]
    pub required: bool,

    /// Closed set of allowed values, when the tracker reports one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

/// Ordered catalog of tracker fields keyed by alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    #[serde(default)]
    fields: BTreeMap<String, FieldSpec>,
}

impl FieldCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field under its alias.
    pub fn insert(&mut self, alias: impl Into<String>, spec: FieldSpec) {
        self.fields.insert(alias.into(), spec);
    }

    /// Looks up a field by alias or by raw id.
    pub fn resolve(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .get(name)
            .or_else(|| self.fields.values().find(|spec| spec.id == name))
    }

    /// Iterates over aliases and specs in alias order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    /// Number of cataloged fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are cataloged.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replaces the whole catalog (used by the refresh operation).
    pub fn replace(&mut self, fields: BTreeMap<String, FieldSpec>) {
        self.fields = fields;
    }

    /// Splits the catalog into (system, custom) field views.
    pub fn partition(&self) -> (Vec<&FieldSpec>, Vec<&FieldSpec>) {
        self.fields
            .values()
            .partition(|spec| is_system_field_id(&spec.id))
    }
}

/// Scope of a comment visibility restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityKind {
    /// Visible to a named group.
    Group,
    /// Visible to a project role.
    Role,
}

/// Visibility restriction attached to tracker comments, emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentVisibility {
    /// Restriction scope.
    #[serde(rename = "type")]
    pub kind: VisibilityKind,
    /// Group or role name.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str) -> FieldSpec {
        FieldSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            field_type: "string".to_string(),
            required: false,
            allowed_values: Vec::new(),
        }
    }

    #[test]
    fn test_field_classification() {
        assert!(is_system_field_id("summary"));
        assert!(is_system_field_id("priority"));
        assert!(!is_system_field_id("customfield_10010"));
        assert!(is_custom_field_id("customfield_10010"));
        assert!(!is_custom_field_id("summary"));
    }

    #[test]
    fn test_resolve_by_alias_and_id() {
        let mut catalog = FieldCatalog::new();
        catalog.insert("team", spec("customfield_10010"));

        assert_eq!(catalog.resolve("team").unwrap().id, "customfield_10010");
        assert_eq!(
            catalog.resolve("customfield_10010").unwrap().id,
            "customfield_10010"
        );
        assert!(catalog.resolve("missing").is_none());
    }

    #[test]
    fn test_partition() {
        let mut catalog = FieldCatalog::new();
        catalog.insert("summary", spec("summary"));
        catalog.insert("team", spec("customfield_10010"));

        let (system, custom) = catalog.partition();
        assert_eq!(system.len(), 1);
        assert_eq!(custom.len(), 1);
    }

    #[test]
    fn test_visibility_serialization() {
        let vis = CommentVisibility {
            kind: VisibilityKind::Group,
            value: "engineering".to_string(),
        };
        let json = serde_json::to_value(&vis).unwrap();
        assert_eq!(json["type"], "group");
        assert_eq!(json["value"], "engineering");
    }

    #[test]
    fn test_catalog_roundtrip() {
        let mut catalog = FieldCatalog::new();
        catalog.insert("severity", spec("customfield_999"));

        let json = serde_json::to_string(&catalog).unwrap();
        let back: FieldCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, catalog);
    }
}
