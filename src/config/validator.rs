//! Config validation: referential integrity and API consistency.

use crate::config::resolved::ColumnKind;
use crate::config::{FullConfig, TableConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.schema.trim().is_empty() {
        return Err(ConfigError::Validation("schema name must not be empty".into()));
    }
    let tables_by_id: HashMap<&str, &TableConfig> = config.tables.iter().map(|t| (t.id.as_str(), t)).collect();
    if tables_by_id.len() != config.tables.len() {
        return Err(ConfigError::Validation("duplicate table id".into()));
    }
    let enum_ids: HashSet<&str> = config.enums.iter().map(|e| e.id.as_str()).collect();
    let has_column = |table_id: &str, column: &str| {
        tables_by_id
            .get(table_id)
            .map(|t| t.columns.iter().any(|c| c.name == column))
            .unwrap_or(false)
    };

    for t in &config.tables {
        if !t.columns.iter().any(|c| c.name == t.primary_key) {
            return Err(ConfigError::InvalidPrimaryKey {
                table_id: t.id.clone(),
                column: t.primary_key.clone(),
            });
        }
        for c in &t.columns {
            if ColumnKind::from_type(c.type_.name(), c.type_.params()).is_none() {
                return Err(ConfigError::Validation(format!(
                    "table {} column {}: unsupported type {}",
                    t.id,
                    c.name,
                    c.type_.name()
                )));
            }
        }
        for u in &t.unique {
            if u.columns.is_empty() {
                return Err(ConfigError::Validation(format!("unique constraint {} has no columns", u.name)));
            }
            for col in &u.columns {
                if !has_column(&t.id, col) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", t.id, col),
                    });
                }
            }
        }
        for ch in &t.check {
            if let Some(col) = &ch.column {
                if !has_column(&t.id, col) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", t.id, col),
                    });
                }
            }
        }
    }

    let mut relationship_ids = HashSet::new();
    for r in &config.relationships {
        if !relationship_ids.insert(r.id.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate relationship id {}", r.id)));
        }
        if !has_column(&r.from_table_id, &r.from_column) || !has_column(&r.to_table_id, &r.to_column) {
            return Err(ConfigError::MissingReference {
                kind: "relationship",
                id: r.id.clone(),
            });
        }
    }

    let mut path_segments = HashSet::new();
    let mut api_tables = HashSet::new();
    for api in &config.api_entities {
        let table = tables_by_id
            .get(api.entity_id.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: api.entity_id.clone(),
            })?;
        if !path_segments.insert(api.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(api.path_segment.clone()));
        }
        api_tables.insert(api.entity_id.as_str());
        for col in api.read_only.iter().chain(api.validation.keys()) {
            if !has_column(&table.id, col) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", table.id, col),
                });
            }
        }
        for (col, rule) in &api.validation {
            if let Some(pattern) = &rule.pattern {
                if let Err(e) = regex::Regex::new(pattern) {
                    return Err(ConfigError::Validation(format!(
                        "{}.{}: invalid pattern: {}",
                        api.entity_id, col, e
                    )));
                }
            }
            if let Some(enum_id) = &rule.choices {
                if !enum_ids.contains(enum_id.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "enum",
                        id: enum_id.clone(),
                    });
                }
            }
        }
        for d in &api.display {
            if !enum_ids.contains(d.enum_id.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "enum",
                    id: d.enum_id.clone(),
                });
            }
            if !has_column(&table.id, &d.column) {
                return Err(ConfigError::MissingReference {
                    kind: "column",
                    id: format!("{}.{}", table.id, d.column),
                });
            }
        }
        for x in &api.expand {
            let rel = config
                .relationships
                .iter()
                .find(|r| r.id == x.relationship)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "relationship",
                    id: x.relationship.clone(),
                })?;
            if rel.from_table_id == api.entity_id {
                if rel.field != x.name {
                    return Err(ConfigError::Validation(format!(
                        "expand {} on {}: to-one expansion must be named after field {}",
                        x.name, api.entity_id, rel.field
                    )));
                }
            } else if rel.to_table_id != api.entity_id {
                return Err(ConfigError::Validation(format!(
                    "expand {} on {}: relationship {} does not touch this entity",
                    x.name, api.entity_id, rel.id
                )));
            }
        }
    }

    // Expanded relationships must stay inside the API surface.
    for api in &config.api_entities {
        for x in &api.expand {
            if let Some(rel) = config.relationships.iter().find(|r| r.id == x.relationship) {
                for t in [&rel.from_table_id, &rel.to_table_id] {
                    if !api_tables.contains(t.as_str()) {
                        return Err(ConfigError::MissingReference {
                            kind: "api entity",
                            id: t.clone(),
                        });
                    }
                }
            }
        }
    }

    check_expansion_acyclic(config)
}

/// Expansions recurse into the related entity's own expansions; a cycle would never end.
fn check_expansion_acyclic(config: &FullConfig) -> Result<(), ConfigError> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for api in &config.api_entities {
        for x in &api.expand {
            if let Some(rel) = config.relationships.iter().find(|r| r.id == x.relationship) {
                let target = if rel.from_table_id == api.entity_id {
                    rel.to_table_id.as_str()
                } else {
                    rel.from_table_id.as_str()
                };
                edges.entry(api.entity_id.as_str()).or_default().push(target);
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), ConfigError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                path.push(node);
                return Err(ConfigError::Validation(format!(
                    "expansion cycle: {}",
                    path.join(" -> ")
                )));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        path.push(node);
        for &next in edges.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            visit(next, edges, marks, path)?;
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for api in &config.api_entities {
        let mut path = Vec::new();
        visit(api.entity_id.as_str(), &edges, &mut marks, &mut path)?;
    }
    Ok(())
}
