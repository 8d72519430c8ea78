//! Tree configuration
//!
//! One `TreeConfig` describes how an entity type stores its hierarchy: which
//! columns hold the parent pointer and bounds, which predicate partitions the
//! table into independent forests, and a few read-side hints.

use crate::db::{Field, Predicate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Predicate partitioning one table into independent forests
///
/// Bound arithmetic never crosses scopes: every read, aggregate and shift the
/// engine issues is additionally filtered by the scope predicate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    predicate: Predicate,
}

impl Scope {
    /// The whole table is one forest
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }

    /// Rows whose property `name` equals `value`, e.g. `owner = "alice"`
    pub fn property_eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(Predicate::all().eq(Field::property(name), value))
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Stable key identifying this scope, used by the mutation lock registry
    pub fn key(&self) -> String {
        serde_json::to_string(&self.predicate).unwrap_or_default()
    }

    /// Write this scope's equality values into `properties`
    ///
    /// Conflicting values are overwritten: a row written through one scope
    /// must never land in another scope's forest.
    pub fn pin(&self, properties: &mut Value) {
        if !properties.is_object() {
            *properties = Value::Object(Map::new());
        }
        if let Some(obj) = properties.as_object_mut() {
            for (name, value) in self.predicate.property_equalities() {
                obj.insert(name.to_string(), value.clone());
            }
        }
    }
}

/// Per-entity tree configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Column holding the parent reference
    pub parent_field: String,

    /// Column holding the left bound
    pub left_field: String,

    /// Column holding the right bound
    pub right_field: String,

    /// Optional depth column, kept current by every mutation when set
    pub level_field: Option<String>,

    /// Property used as label by `generate_list` and as default `reorder` key
    pub display_field: String,

    /// Forest partition predicate
    pub scope: Scope,

    /// Traversal-depth hint: `generate_list` omits rows deeper than this
    pub max_depth: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            parent_field: "parent_id".to_string(),
            left_field: "lft".to_string(),
            right_field: "rght".to_string(),
            level_field: None,
            display_field: "name".to_string(),
            scope: Scope::all(),
            max_depth: None,
        }
    }
}

impl TreeConfig {
    /// Same configuration restricted to another scope
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Enable the depth column
    pub fn with_level(mut self, field: impl Into<String>) -> Self {
        self.level_field = Some(field.into());
        self
    }

    pub fn tracks_level(&self) -> bool {
        self.level_field.is_some()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let mut columns = vec![
            ("parent_field", self.parent_field.as_str()),
            ("left_field", self.left_field.as_str()),
            ("right_field", self.right_field.as_str()),
        ];
        if let Some(level) = &self.level_field {
            columns.push(("level_field", level.as_str()));
        }

        for (name, column) in &columns {
            if column.is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
            if !crate::db::is_valid_identifier(column) {
                return Err(format!("{} '{}' is not a valid column name", name, column));
            }
            if *column == "id" || *column == "properties" {
                return Err(format!("{} cannot reuse reserved column '{}'", name, column));
            }
        }

        for (i, (name, column)) in columns.iter().enumerate() {
            if let Some((other, _)) = columns[i + 1..].iter().find(|(_, c)| c == column) {
                return Err(format!(
                    "{} and {} both use column '{}'",
                    name, other, column
                ));
            }
        }

        if self.display_field.is_empty() {
            return Err("display_field cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = TreeConfig::default();
        assert_eq!(config.parent_field, "parent_id");
        assert_eq!(config.left_field, "lft");
        assert_eq!(config.right_field, "rght");
        assert!(config.level_field.is_none());
        assert!(config.scope.predicate().is_unconditional());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TreeConfig::default();

        // Invalid: empty column
        config.left_field = String::new();
        assert!(config.validate().is_err());

        // Invalid: duplicate column
        config.left_field = "rght".to_string();
        assert!(config.validate().is_err());

        // Invalid: not an identifier
        config.left_field = "lft; --".to_string();
        assert!(config.validate().is_err());

        // Invalid: level shares a bound column
        config.left_field = "lft".to_string();
        config.level_field = Some("lft".to_string());
        assert!(config.validate().is_err());

        // Invalid: reserved column
        config.level_field = Some("properties".to_string());
        assert!(config.validate().is_err());

        config.level_field = Some("depth".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: TreeConfig = serde_json::from_value(json!({
            "left_field": "left_bound",
            "scope": [{"compare": {"field": {"property": "owner"}, "op": "eq", "operand": {"value": "alice"}}}]
        }))
        .unwrap();
        assert_eq!(config.left_field, "left_bound");
        assert_eq!(config.right_field, "rght");
        assert_eq!(config.scope, Scope::property_eq("owner", "alice"));
    }

    #[test]
    fn test_scope_pin_overrides_conflicting_values() {
        let scope = Scope::property_eq("owner", "alice");

        let mut props = json!({"name": "A"});
        scope.pin(&mut props);
        assert_eq!(props, json!({"name": "A", "owner": "alice"}));

        let mut foreign = json!({"name": "B", "owner": "bob"});
        scope.pin(&mut foreign);
        assert_eq!(foreign, json!({"name": "B", "owner": "alice"}));

        let mut not_object = Value::Null;
        scope.pin(&mut not_object);
        assert_eq!(not_object, json!({"owner": "alice"}));
    }

    #[test]
    fn test_scope_keys_distinguish_scopes() {
        assert_ne!(
            Scope::property_eq("owner", "alice").key(),
            Scope::property_eq("owner", "bob").key()
        );
        assert_eq!(Scope::all().key(), Scope::default().key());
    }
}
