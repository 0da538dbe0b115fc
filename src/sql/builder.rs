//! Builds parameterized INSERT, SELECT, UPDATE, DELETE and JSON read projections from a resolved entity.

use crate::config::{ColumnKind, ResolvedEntity, ResolvedModel};
use crate::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;

/// Alias of the outermost table in every SELECT.
pub const ROOT_ALIAS: &str = "t0";

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Single-quoted SQL string literal (config text only).
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Full qualified table name.
pub fn qualified_table(entity: &ResolvedEntity) -> String {
    format!("{}.{}", quoted(&entity.schema_name), quoted(&entity.table_name))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a value and return its cast placeholder, e.g. `$2::numeric`.
    fn push_param(&mut self, v: Value, kind: &ColumnKind) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), kind.pg_cast())
    }
}

/// JSON projection of `entity` over alias `t0`, recursing into expansions.
/// Numeric columns render as decimal strings so scale survives the trip ("2.50").
pub fn read_projection(model: &ResolvedModel, entity: &ResolvedEntity) -> Result<String, ConfigError> {
    let mut next_alias = 1;
    projection(model, entity, ROOT_ALIAS, &mut next_alias)
}

fn projection(
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    alias: &str,
    next_alias: &mut u32,
) -> Result<String, ConfigError> {
    let mut parts: Vec<String> = Vec::new();
    for c in &entity.columns {
        let col = format!("{}.{}", alias, quoted(&c.name));
        if let Some(r) = entity.reference_for(&c.name) {
            let expr = if r.expand {
                let related = related_entity(model, &r.related_entity_id)?;
                let sub = format!("t{}", *next_alias);
                *next_alias += 1;
                let inner = projection(model, related, &sub, next_alias)?;
                format!(
                    "(SELECT {} FROM {} {} WHERE {}.{} = {})",
                    inner,
                    qualified_table(related),
                    sub,
                    sub,
                    quoted(&r.related_column),
                    col
                )
            } else {
                col
            };
            parts.push(format!("{}, {}", literal(&r.field), expr));
            continue;
        }
        let expr = match c.kind {
            ColumnKind::Numeric { .. } => format!("{}::text", col),
            _ => col.clone(),
        };
        parts.push(format!("{}, {}", literal(&c.name), expr));
        for d in entity.displays.iter().filter(|d| d.column == c.name) {
            let whens: Vec<String> = d
                .labels
                .iter()
                .map(|(code, label)| format!("WHEN {} THEN {}", literal(code), literal(label)))
                .collect();
            parts.push(format!(
                "{}, CASE {} {} ELSE {} END",
                literal(&d.name),
                col,
                whens.join(" "),
                col
            ));
        }
    }
    for inc in &entity.includes {
        let child = related_entity(model, &inc.child_entity_id)?;
        let sub = format!("t{}", *next_alias);
        *next_alias += 1;
        let inner = projection(model, child, &sub, next_alias)?;
        parts.push(format!(
            "{}, (SELECT COALESCE(json_agg({} ORDER BY {}.{}), '[]'::json) FROM {} {} WHERE {}.{} = {}.{})",
            literal(&inc.name),
            inner,
            sub,
            quoted(&child.pk_column),
            qualified_table(child),
            sub,
            sub,
            quoted(&inc.child_column),
            alias,
            quoted(&inc.our_column)
        ));
    }
    Ok(format!("json_build_object({})", parts.join(", ")))
}

fn related_entity<'a>(model: &'a ResolvedModel, id: &str) -> Result<&'a ResolvedEntity, ConfigError> {
    model.entity_by_id(id).ok_or_else(|| ConfigError::MissingReference {
        kind: "api entity",
        id: id.to_string(),
    })
}

/// SELECT every row as JSON, ORDER BY pk.
pub fn select_list(entity: &ResolvedEntity) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT {} AS \"row\" FROM {} {} ORDER BY {}.{}",
        entity.read_projection,
        qualified_table(entity),
        ROOT_ALIAS,
        ROOT_ALIAS,
        quoted(&entity.pk_column)
    );
    q
}

/// SELECT one row as JSON by primary key.
pub fn select_by_id(entity: &ResolvedEntity, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(Value::from(id), &ColumnKind::BigInt);
    q.sql = format!(
        "SELECT {} AS \"row\" FROM {} {} WHERE {}.{} = {}",
        entity.read_projection,
        qualified_table(entity),
        ROOT_ALIAS,
        ROOT_ALIAS,
        quoted(&entity.pk_column),
        ph
    );
    q
}

/// INSERT the body's columns (entity column order), RETURNING pk.
/// Columns absent from the body are left to their DB default.
pub fn insert(entity: &ResolvedEntity, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in entity.columns.iter().filter(|c| !c.is_pk) {
        let Some(v) = body.get(&c.name) else { continue };
        placeholders.push(q.push_param(v.clone(), &c.kind));
        cols.push(quoted(&c.name));
    }
    let pk = quoted(&entity.pk_column);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, pk)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            pk
        )
    };
    q
}

/// UPDATE by id: SET only columns present in body, RETURNING pk.
/// An empty body degrades to an existence probe.
pub fn update(entity: &ResolvedEntity, id: i64, body: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let pk = quoted(&entity.pk_column);
    let mut sets = Vec::new();
    for c in entity.columns.iter().filter(|c| !c.is_pk) {
        let Some(v) = body.get(&c.name) else { continue };
        let ph = q.push_param(v.clone(), &c.kind);
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    let id_ph = q.push_param(Value::from(id), &ColumnKind::BigInt);
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {} = {} FOR UPDATE", pk, table, pk, id_ph)
    } else {
        format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            table,
            sets.join(", "),
            pk,
            id_ph,
            pk
        )
    };
    q
}

/// DELETE by id, RETURNING pk.
pub fn delete(entity: &ResolvedEntity, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = quoted(&entity.pk_column);
    let ph = q.push_param(Value::from(id), &ColumnKind::BigInt);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(entity),
        pk,
        ph,
        pk
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&FullConfig::builtin().unwrap()).unwrap()
    }

    #[test]
    fn ingredient_projection_renders_decimal_and_label() {
        let model = model();
        let ingredient = model.entity_by_path("ingredient").unwrap();
        let p = &ingredient.read_projection;
        assert!(p.starts_with("json_build_object('id', t0.\"id\""));
        assert!(p.contains("'price_per_unit', t0.\"price_per_unit\"::text"));
        assert!(p.contains("'unit_display', CASE t0.\"unit\" WHEN 'g' THEN 'Gram'"));
        assert!(p.contains("WHEN 'l' THEN 'Liter' ELSE t0.\"unit\" END"));
    }

    #[test]
    fn recipe_projection_keeps_donut_key_and_embeds_ingredient() {
        let model = model();
        let recipe = model.entity_by_path("recipe").unwrap();
        let p = &recipe.read_projection;
        assert!(p.contains("'donut', t0.\"donut_id\""));
        assert!(p.contains(
            "'ingredient', (SELECT json_build_object('id', t1.\"id\""
        ));
        assert!(p.contains("FROM \"donuts\".\"ingredient\" t1 WHERE t1.\"id\" = t0.\"ingredient_id\")"));
        assert!(!p.contains("'ingredient_id'"));
    }

    #[test]
    fn donut_projection_aggregates_recipes_in_id_order() {
        let model = model();
        let donut = model.entity_by_path("donut").unwrap();
        let p = &donut.read_projection;
        assert!(p.contains("'ingredients', (SELECT COALESCE(json_agg(json_build_object("));
        assert!(p.contains("ORDER BY t1.\"id\"), '[]'::json) FROM \"donuts\".\"recipe\" t1 WHERE t1.\"donut_id\" = t0.\"id\")"));
        // Nested ingredient inside each recipe gets its own alias.
        assert!(p.contains("FROM \"donuts\".\"ingredient\" t2 WHERE t2.\"id\" = t1.\"ingredient_id\""));
    }

    #[test]
    fn select_by_id_binds_bigint() {
        let model = model();
        let donut = model.entity_by_path("donut").unwrap();
        let q = select_by_id(donut, 7);
        assert!(q.sql.ends_with("FROM \"donuts\".\"donut\" t0 WHERE t0.\"id\" = $1::bigint"));
        assert_eq!(q.params, vec![json!(7)]);
        let list = select_list(donut);
        assert!(list.sql.ends_with("ORDER BY t0.\"id\""));
        assert!(list.params.is_empty());
    }

    #[test]
    fn insert_follows_column_order_with_casts() {
        let model = model();
        let ingredient = model.entity_by_path("ingredient").unwrap();
        let body: HashMap<String, Value> = [
            ("unit".to_string(), json!("kg")),
            ("name".to_string(), json!("Flour")),
            ("price_per_unit".to_string(), json!("1.20")),
        ]
        .into_iter()
        .collect();
        let q = insert(ingredient, &body);
        assert_eq!(
            q.sql,
            "INSERT INTO \"donuts\".\"ingredient\" (\"name\", \"price_per_unit\", \"unit\") VALUES ($1::text, $2::numeric, $3::text) RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!("Flour"), json!("1.20"), json!("kg")]);
    }

    #[test]
    fn update_sets_present_columns_then_id() {
        let model = model();
        let review = model.entity_by_path("review").unwrap();
        let body: HashMap<String, Value> = [("rating".to_string(), json!(4))].into_iter().collect();
        let q = update(review, 3, &body);
        assert_eq!(
            q.sql,
            "UPDATE \"donuts\".\"review\" SET \"rating\" = $1::smallint WHERE \"id\" = $2::bigint RETURNING \"id\""
        );
        assert_eq!(q.params, vec![json!(4), json!(3)]);

        let probe = update(review, 3, &HashMap::new());
        assert!(probe.sql.starts_with("SELECT \"id\" FROM \"donuts\".\"review\""));
        assert_eq!(probe.params, vec![json!(3)]);
    }

    #[test]
    fn delete_returns_pk() {
        let model = model();
        let order = model.entity_by_path("order").unwrap();
        let q = delete(order, 11);
        assert_eq!(
            q.sql,
            "DELETE FROM \"donuts\".\"customer_order\" WHERE \"id\" = $1::bigint RETURNING \"id\""
        );
    }

    #[test]
    fn identifiers_and_literals_are_escaped() {
        assert_eq!(quoted("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(literal("O'Hara"), "'O''Hara'");
    }
}
