//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use std::collections::{HashMap, HashSet};

/// Value kind of a column, driving input coercion and SQL casts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    BigInt,
    Integer,
    SmallInt,
    Numeric { precision: u32, scale: u32 },
    Varchar { max_length: Option<u32> },
    Text,
    Boolean,
    Date,
    Timestamptz,
}

impl ColumnKind {
    /// Parse a config type name (and params) into a kind. `None` for unsupported types.
    pub fn from_type(name: &str, params: &[u32]) -> Option<ColumnKind> {
        Some(match name.to_lowercase().as_str() {
            "bigserial" | "bigint" | "int8" => ColumnKind::BigInt,
            "serial" | "integer" | "int" | "int4" => ColumnKind::Integer,
            "smallint" | "int2" => ColumnKind::SmallInt,
            "numeric" | "decimal" => ColumnKind::Numeric {
                precision: params.first().copied().unwrap_or(18),
                scale: params.get(1).copied().unwrap_or(0),
            },
            "varchar" | "character varying" => ColumnKind::Varchar {
                max_length: params.first().copied(),
            },
            "text" => ColumnKind::Text,
            "boolean" | "bool" => ColumnKind::Boolean,
            "date" => ColumnKind::Date,
            "timestamptz" | "timestamp with time zone" => ColumnKind::Timestamptz,
            _ => return None,
        })
    }

    /// Cast applied to bound parameters (`$1::numeric`).
    pub fn pg_cast(&self) -> &'static str {
        match self {
            ColumnKind::BigInt => "bigint",
            ColumnKind::Integer => "integer",
            ColumnKind::SmallInt => "smallint",
            ColumnKind::Numeric { .. } => "numeric",
            ColumnKind::Varchar { .. } | ColumnKind::Text => "text",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Date => "date",
            ColumnKind::Timestamptz => "timestamptz",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub is_pk: bool,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. NOW(), CURRENT_DATE).
    pub has_default: bool,
}

/// Outgoing foreign key of an entity.
#[derive(Clone, Debug)]
pub struct ReferenceSpec {
    pub constraint: String,
    /// Our FK column, also the write-side field name.
    pub column: String,
    /// Read-side field name.
    pub field: String,
    pub related_entity_id: String,
    pub related_column: String,
    /// Embed the related row instead of its key.
    pub expand: bool,
}

/// Incoming foreign key embedded as a list of referencing rows.
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    pub name: String,
    pub child_entity_id: String,
    /// Child's FK column.
    pub child_column: String,
    /// Our column the child references.
    pub our_column: String,
}

#[derive(Clone, Debug)]
pub struct DisplaySpec {
    pub name: String,
    pub column: String,
    /// (code, label) pairs.
    pub labels: Vec<(String, String)>,
}

/// How a storage constraint violation is reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstraintTarget {
    Unique { columns: Vec<String> },
    ForeignKey { column: String },
    Check { column: Option<String> },
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub id: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub pk_column: String,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    pub references: Vec<ReferenceSpec>,
    pub includes: Vec<IncludeSpec>,
    pub displays: Vec<DisplaySpec>,
    pub read_only: HashSet<String>,
    pub validation: HashMap<String, ValidationRule>,
    pub constraints: HashMap<String, ConstraintTarget>,
    /// `json_build_object(...)` over alias `t0`, filled in once all entities are known.
    pub read_projection: String,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn reference_for(&self, column: &str) -> Option<&ReferenceSpec> {
        self.references.iter().find(|r| r.column == column)
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    /// Columns accepted on input: everything except the primary key and read-only columns.
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| !c.is_pk && !self.read_only.contains(&c.name))
    }

    /// Response-only keys that differ from any writable column name.
    pub fn is_read_side_name(&self, key: &str) -> bool {
        key == self.pk_column
            || self.read_only.contains(key)
            || self.displays.iter().any(|d| d.name == key)
            || self.includes.iter().any(|i| i.name == key)
            || self.references.iter().any(|r| r.field == key)
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    by_path: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn new(entities: Vec<ResolvedEntity>) -> Self {
        let by_path = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path_segment.clone(), i))
            .collect();
        let by_id = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        ResolvedModel {
            entities,
            by_path,
            by_id,
        }
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.by_path.get(path).map(|&i| &self.entities[i])
    }

    pub fn entity_by_id(&self, id: &str) -> Option<&ResolvedEntity> {
        self.by_id.get(id).map(|&i| &self.entities[i])
    }
}
