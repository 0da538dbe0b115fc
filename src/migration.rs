//! Apply config to the database: schema, tables with their named constraints, then foreign keys.
//! Every statement is idempotent, so running against an existing schema is a no-op.

use crate::config::types::{FullConfig, RelationshipConfig, TableConfig};
use crate::config::validate;
use crate::error::{AppError, ConfigError};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Validates config first, then runs all DDL in one transaction.
pub async fn apply_migrations(pool: &PgPool, config: &FullConfig) -> Result<(), AppError> {
    validate(config)?;

    let schema = quote(&config.schema);
    let tables_by_id: HashMap<&str, &TableConfig> =
        config.tables.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut tx = pool.begin().await?;
    execute(&mut tx, &format!("CREATE SCHEMA IF NOT EXISTS {}", schema)).await?;

    for t in &config.tables {
        execute(&mut tx, &create_table_sql(&schema, t)).await?;
    }

    for r in &config.relationships {
        let from = lookup_table(&tables_by_id, &r.from_table_id)?;
        let to = lookup_table(&tables_by_id, &r.to_table_id)?;
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pg_constraint c JOIN pg_namespace n ON n.oid = c.connamespace \
             WHERE n.nspname = $1 AND c.conname = $2)",
        )
        .bind(&config.schema)
        .bind(&r.id)
        .fetch_one(&mut *tx)
        .await?;
        if exists.0 {
            continue;
        }
        execute(&mut tx, &foreign_key_sql(&schema, from, to, r)).await?;
    }

    tx.commit().await?;
    tracing::info!(
        schema = %config.schema,
        tables = config.tables.len(),
        relationships = config.relationships.len(),
        "migrations applied"
    );
    Ok(())
}

async fn execute(conn: &mut PgConnection, sql: &str) -> Result<(), AppError> {
    tracing::debug!(sql = %sql, "ddl");
    sqlx::query(sql).execute(&mut *conn).await?;
    Ok(())
}

fn lookup_table<'a>(
    tables: &HashMap<&str, &'a TableConfig>,
    id: &str,
) -> Result<&'a TableConfig, ConfigError> {
    tables.get(id).copied().ok_or_else(|| ConfigError::MissingReference {
        kind: "table",
        id: id.to_string(),
    })
}

pub(crate) fn create_table_sql(schema: &str, t: &TableConfig) -> String {
    let mut defs: Vec<String> = t
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote(&c.name), c.type_.ddl());
            if !c.nullable || c.name == t.primary_key {
                def.push_str(" NOT NULL");
            }
            if let Some(d) = &c.default {
                def.push_str(" DEFAULT ");
                def.push_str(d.sql());
            }
            def
        })
        .collect();
    defs.push(format!(
        "CONSTRAINT {} PRIMARY KEY ({})",
        quote(&format!("{}_pkey", t.name)),
        quote(&t.primary_key)
    ));
    for u in &t.unique {
        let cols: Vec<String> = u.columns.iter().map(|c| quote(c)).collect();
        defs.push(format!("CONSTRAINT {} UNIQUE ({})", quote(&u.name), cols.join(", ")));
    }
    for c in &t.check {
        defs.push(format!("CONSTRAINT {} CHECK ({})", quote(&c.name), c.expression));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\n    {}\n)",
        schema,
        quote(&t.name),
        defs.join(",\n    ")
    )
}

pub(crate) fn foreign_key_sql(
    schema: &str,
    from: &TableConfig,
    to: &TableConfig,
    r: &RelationshipConfig,
) -> String {
    let on_delete = r.on_delete.as_deref().unwrap_or("NO ACTION");
    format!(
        "ALTER TABLE {}.{} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}.{} ({}) ON DELETE {}",
        schema,
        quote(&from.name),
        quote(&r.id),
        quote(&r.from_column),
        schema,
        quote(&to.name),
        quote(&r.to_column),
        on_delete
    )
}
