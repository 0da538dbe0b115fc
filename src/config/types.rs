//! Raw schema config types matching the bundled JSON (`config/donut_shop.json`).

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumValue {
    pub code: String,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnumConfig {
    pub id: String,
    pub values: Vec<EnumValue>,
}

impl EnumConfig {
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.code.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableCheck {
    pub name: String,
    /// Column reported in field errors when the check is violated.
    #[serde(default)]
    pub column: Option<String>,
    pub expression: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UniqueConfig {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }

    pub fn params(&self) -> &[u32] {
        match self {
            ColumnTypeConfig::Simple(_) => &[],
            ColumnTypeConfig::Parameterized { params, .. } => params.as_deref().unwrap_or(&[]),
        }
    }

    /// DDL spelling, e.g. `numeric(6, 2)`.
    pub fn ddl(&self) -> String {
        let params = self.params();
        if params.is_empty() {
            self.name().to_string()
        } else {
            let p: Vec<String> = params.iter().map(|n| n.to_string()).collect();
            format!("{}({})", self.name(), p.join(", "))
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression { expression: String },
}

impl ColumnDefaultConfig {
    pub fn sql(&self) -> &str {
        match self {
            ColumnDefaultConfig::Literal(s) => s.as_str(),
            ColumnDefaultConfig::Expression { expression } => expression.as_str(),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnDefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) => Ok(ColumnDefaultConfig::Literal(s)),
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::String(s)) = obj.remove("expression") {
                    return Ok(ColumnDefaultConfig::Expression { expression: s });
                }
                Err(serde::de::Error::custom(format!(
                    "column default must be a string or {{ \"expression\": \"...\" }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            other => Err(serde::de::Error::custom(format!(
                "column default must be a string or {{ \"expression\": \"...\" }}; got {}",
                type_name_of_json(&other)
            ))),
        }
    }
}

pub(crate) fn type_name_of_json(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefaultConfig>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub id: String,
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub unique: Vec<UniqueConfig>,
    #[serde(default)]
    pub check: Vec<TableCheck>,
}

/// Foreign key from `from_table_id.from_column` to `to_table_id.to_column`.
/// The id doubles as the constraint name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub id: String,
    pub from_table_id: String,
    pub from_column: String,
    pub to_table_id: String,
    pub to_column: String,
    /// Response key for the reference (`ingredient` for `ingredient_id`).
    pub field: String,
    #[serde(default)]
    pub on_delete: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    /// Enum id whose codes become `allowed` at resolve time.
    #[serde(default)]
    pub choices: Option<String>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// `pattern` compiled once at resolve time.
    #[serde(skip)]
    pub compiled_pattern: Option<Regex>,
}

/// Inline expansion of a relationship in read responses.
/// When the relationship starts at this entity it embeds one row under `name`
/// (which must equal the relationship field); when it points at this entity it embeds
/// the list of referencing rows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExpandConfig {
    pub name: String,
    pub relationship: String,
}

/// Read-only label for an enum-coded column.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub name: String,
    pub column: String,
    #[serde(rename = "enum")]
    pub enum_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEntityConfig {
    pub entity_id: String,
    pub path_segment: String,
    pub operations: Vec<String>,
    /// Columns set by the database only; ignored on input.
    #[serde(default)]
    pub read_only: Vec<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub expand: Vec<ExpandConfig>,
    #[serde(default)]
    pub display: Vec<DisplayConfig>,
}

/// All config in one struct.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FullConfig {
    /// PostgreSQL schema holding every table.
    pub schema: String,
    #[serde(default)]
    pub enums: Vec<EnumConfig>,
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    pub api_entities: Vec<ApiEntityConfig>,
}
