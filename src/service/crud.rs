//! Generic CRUD execution against PostgreSQL.

use crate::config::{ConstraintTarget, ResolvedEntity};
use crate::error::{AppError, FieldErrors, NON_FIELD_ERRORS};
use crate::sql::{delete, insert, select_by_id, select_list, update, PgBindValue, QueryBuf};
use serde_json::Value;
use sqlx::error::ErrorKind;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::{PgConnection, PgPool, Postgres};
use std::collections::HashMap;

pub struct CrudService;

impl CrudService {
    /// All rows, ordered by primary key, in their read representation.
    pub async fn list(pool: &PgPool, entity: &ResolvedEntity) -> Result<Vec<Value>, AppError> {
        let q = select_list(entity);
        tracing::debug!(sql = %q.sql, "query");
        let rows = bind_scalar::<Value>(&q).fetch_all(pool).await?;
        Ok(rows)
    }

    /// Fetch one row by primary key. Returns JSON object or None.
    pub async fn read(pool: &PgPool, entity: &ResolvedEntity, id: i64) -> Result<Option<Value>, AppError> {
        let mut conn = pool.acquire().await?;
        Self::read_on(&mut conn, entity, id).await
    }

    /// Insert one row from a decoded body; returns the created row.
    /// Constraint violations surface as conflict / reference / validation errors and nothing is written.
    pub async fn create(
        pool: &PgPool,
        entity: &ResolvedEntity,
        body: &HashMap<String, Value>,
    ) -> Result<Value, AppError> {
        let q = insert(entity, body);
        let mut tx = pool.begin().await?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let id = bind_scalar::<i64>(&q)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify(entity, body, e))?;
        let row = Self::read_on(&mut tx, entity, id)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        tx.commit().await?;
        tracing::info!(entity = %entity.path_segment, id, "created");
        Ok(row)
    }

    /// Update one row by id with the decoded columns. Returns the updated row, or None if the id is unknown.
    pub async fn update(
        pool: &PgPool,
        entity: &ResolvedEntity,
        id: i64,
        body: &HashMap<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let q = update(entity, id, body);
        let mut tx = pool.begin().await?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        let updated = bind_scalar::<i64>(&q)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| classify(entity, body, e))?;
        let Some(id) = updated else {
            return Ok(None);
        };
        let row = Self::read_on(&mut tx, entity, id).await?;
        tx.commit().await?;
        tracing::info!(entity = %entity.path_segment, id, "updated");
        Ok(row)
    }

    /// Delete one row by id; dependants go with it through ON DELETE CASCADE.
    /// Returns false if the id is unknown.
    pub async fn delete(pool: &PgPool, entity: &ResolvedEntity, id: i64) -> Result<bool, AppError> {
        let q = delete(entity, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let deleted = bind_scalar::<i64>(&q)
            .fetch_optional(pool)
            .await
            .map_err(|e| classify(entity, &HashMap::new(), e))?;
        if deleted.is_some() {
            tracing::info!(entity = %entity.path_segment, id, "deleted");
        }
        Ok(deleted.is_some())
    }

    async fn read_on(
        conn: &mut PgConnection,
        entity: &ResolvedEntity,
        id: i64,
    ) -> Result<Option<Value>, AppError> {
        let q = select_by_id(entity, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bind_scalar::<Value>(&q).fetch_optional(&mut *conn).await?;
        Ok(row)
    }
}

fn bind_scalar<'q, O>(q: &'q QueryBuf) -> QueryScalar<'q, Postgres, O, PgArguments>
where
    (O,): for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow>,
{
    let mut query = sqlx::query_scalar::<_, O>(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

/// Map a storage constraint violation to the error taxonomy using the entity's constraint table.
fn classify(entity: &ResolvedEntity, body: &HashMap<String, Value>, err: sqlx::Error) -> AppError {
    let sqlx::Error::Database(db) = &err else {
        return AppError::Db(err);
    };
    let target = db.constraint().and_then(|name| entity.constraints.get(name));
    tracing::warn!(
        entity = %entity.path_segment,
        constraint = ?db.constraint(),
        kind = ?db.kind(),
        "constraint violation"
    );
    match (db.kind(), target) {
        (ErrorKind::UniqueViolation, Some(ConstraintTarget::Unique { columns })) => {
            AppError::Conflict(unique_errors(entity, columns))
        }
        (ErrorKind::UniqueViolation, _) => AppError::Conflict(FieldErrors::single(
            NON_FIELD_ERRORS,
            format!("{} violates a uniqueness constraint.", entity.path_segment),
        )),
        (ErrorKind::ForeignKeyViolation, Some(ConstraintTarget::ForeignKey { column })) => {
            let given = body.get(column).map(display_key).unwrap_or_default();
            AppError::ReferenceNotFound(FieldErrors::single(
                column.as_str(),
                format!("Invalid pk \"{}\" - object does not exist.", given),
            ))
        }
        // Raised on delete when a referencing row blocks it.
        (ErrorKind::ForeignKeyViolation, _) => AppError::Conflict(FieldErrors::single(
            NON_FIELD_ERRORS,
            format!("{} is still referenced by other records.", entity.path_segment),
        )),
        (ErrorKind::CheckViolation, Some(ConstraintTarget::Check { column })) => {
            let field = column.as_deref().unwrap_or(NON_FIELD_ERRORS);
            AppError::Validation(FieldErrors::single(field, "Value violates a database constraint."))
        }
        (ErrorKind::NotNullViolation, _) => {
            let field = db
                .message()
                .split('"')
                .nth(1)
                .unwrap_or(NON_FIELD_ERRORS)
                .to_string();
            AppError::Validation(FieldErrors::single(field, "This field may not be null."))
        }
        _ => AppError::Db(err),
    }
}

fn unique_errors(entity: &ResolvedEntity, columns: &[String]) -> FieldErrors {
    match columns {
        [single] => FieldErrors::single(
            single.as_str(),
            format!("{} with this {} already exists.", entity.path_segment, single.replace('_', " ")),
        ),
        many => FieldErrors::single(
            NON_FIELD_ERRORS,
            format!("The fields {} must make a unique set.", many.join(", ")),
        ),
    }
}

fn display_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
