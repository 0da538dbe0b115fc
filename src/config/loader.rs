//! Load config from the bundled JSON or a file, and resolve it into the runtime model.

use crate::config::resolved::{
    ColumnInfo, ColumnKind, ConstraintTarget, DisplaySpec, IncludeSpec, ReferenceSpec, ResolvedEntity,
    ResolvedModel,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::sql::read_projection;
use std::collections::{HashMap, HashSet};
use std::path::Path;

const BUILTIN_CONFIG: &str = include_str!("../../config/donut_shop.json");

impl FullConfig {
    /// The donut-shop schema shipped with the crate.
    pub fn builtin() -> Result<FullConfig, ConfigError> {
        FullConfig::from_json_str(BUILTIN_CONFIG)
    }

    pub fn from_json_str(s: &str) -> Result<FullConfig, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))
    }
}

/// Read a schema config file (same layout as `config/donut_shop.json`).
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    FullConfig::from_json_str(&raw)
}

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let tables_by_id: HashMap<_, _> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    let enums_by_id: HashMap<_, _> = config.enums.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut entities = Vec::with_capacity(config.api_entities.len());
    for api in &config.api_entities {
        let table = tables_by_id
            .get(api.entity_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            })?;

        let mut columns = Vec::with_capacity(table.columns.len());
        for c in &table.columns {
            let kind = ColumnKind::from_type(c.type_.name(), c.type_.params()).ok_or_else(|| {
                ConfigError::Validation(format!("unsupported column type {}", c.type_.name()))
            })?;
            columns.push(ColumnInfo {
                name: c.name.clone(),
                kind,
                is_pk: c.name == table.primary_key,
                nullable: c.nullable,
                has_default: c.default.is_some() || c.type_.name().ends_with("serial"),
            });
        }

        let expanded: HashSet<&str> = api.expand.iter().map(|x| x.relationship.as_str()).collect();
        let references: Vec<ReferenceSpec> = config
            .relationships
            .iter()
            .filter(|r| r.from_table_id == table.id)
            .map(|r| ReferenceSpec {
                constraint: r.id.clone(),
                column: r.from_column.clone(),
                field: r.field.clone(),
                related_entity_id: r.to_table_id.clone(),
                related_column: r.to_column.clone(),
                expand: expanded.contains(r.id.as_str()),
            })
            .collect();

        let includes: Vec<IncludeSpec> = api
            .expand
            .iter()
            .filter_map(|x| {
                let rel = config.relationships.iter().find(|r| r.id == x.relationship)?;
                (rel.to_table_id == table.id && rel.from_table_id != table.id).then(|| IncludeSpec {
                    name: x.name.clone(),
                    child_entity_id: rel.from_table_id.clone(),
                    child_column: rel.from_column.clone(),
                    our_column: rel.to_column.clone(),
                })
            })
            .collect();

        let mut displays = Vec::with_capacity(api.display.len());
        for d in &api.display {
            let e = enums_by_id.get(d.enum_id.as_str()).ok_or_else(|| ConfigError::MissingReference {
                kind: "enum",
                id: d.enum_id.clone(),
            })?;
            displays.push(DisplaySpec {
                name: d.name.clone(),
                column: d.column.clone(),
                labels: e.values.iter().map(|v| (v.code.clone(), v.label.clone())).collect(),
            });
        }

        let mut validation = api.validation.clone();
        for rule in validation.values_mut() {
            if let Some(pattern) = &rule.pattern {
                let re = regex::Regex::new(pattern)
                    .map_err(|e| ConfigError::Validation(format!("invalid pattern {}: {}", pattern, e)))?;
                rule.compiled_pattern = Some(re);
            }
            if let Some(enum_id) = &rule.choices {
                let e = enums_by_id.get(enum_id.as_str()).ok_or_else(|| ConfigError::MissingReference {
                    kind: "enum",
                    id: enum_id.clone(),
                })?;
                rule.allowed = Some(e.codes().map(|c| serde_json::Value::String(c.to_string())).collect());
            }
        }

        let mut constraints = HashMap::new();
        for u in &table.unique {
            constraints.insert(
                u.name.clone(),
                ConstraintTarget::Unique {
                    columns: u.columns.clone(),
                },
            );
        }
        for ch in &table.check {
            constraints.insert(ch.name.clone(), ConstraintTarget::Check { column: ch.column.clone() });
        }
        for r in &references {
            constraints.insert(
                r.constraint.clone(),
                ConstraintTarget::ForeignKey {
                    column: r.column.clone(),
                },
            );
        }

        entities.push(ResolvedEntity {
            id: table.id.clone(),
            schema_name: config.schema.clone(),
            table_name: table.name.clone(),
            path_segment: api.path_segment.clone(),
            pk_column: table.primary_key.clone(),
            columns,
            operations: api.operations.clone(),
            references,
            includes,
            displays,
            read_only: api.read_only.iter().cloned().collect(),
            validation,
            constraints,
            read_projection: String::new(),
        });
    }

    let mut model = ResolvedModel::new(entities);
    let projections = model
        .entities
        .iter()
        .map(|e| read_projection(&model, e))
        .collect::<Result<Vec<_>, _>>()?;
    for (entity, projection) in model.entities.iter_mut().zip(projections) {
        entity.read_projection = projection;
    }
    tracing::debug!(entities = model.entities.len(), schema = %config.schema, "resolved model");
    Ok(model)
}
