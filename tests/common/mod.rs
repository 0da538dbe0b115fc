//! Shared helpers for router-level tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use donut_shop::{apply_migrations, build_router, resolve, AppState, FullConfig};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

pub const BODY_LIMIT: usize = 64 * 1024;

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Router over a pool that never connects. Only paths that fail before touching storage
/// can be exercised with it.
pub fn offline_app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/donut_shop_offline")
        .expect("lazy pool");
    let model = resolve(&FullConfig::builtin().expect("builtin config")).expect("resolve");
    build_router(AppState::new(pool, model), BODY_LIMIT)
}

/// A migrated throwaway schema plus a router bound to it.
pub struct TestDb {
    pub app: Router,
    pub pool: PgPool,
    pub schema: String,
}

impl TestDb {
    /// None when DATABASE_URL is unset, so database tests skip instead of failing.
    pub async fn start() -> Option<TestDb> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping database test");
            return None;
        };
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .expect("connect to DATABASE_URL");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let schema = format!(
            "donuts_test_{}_{}_{}",
            std::process::id(),
            SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst),
            nanos
        );
        let mut config = FullConfig::builtin().expect("builtin config");
        config.schema = schema.clone();
        apply_migrations(&pool, &config).await.expect("migrations");
        let model = resolve(&config).expect("resolve");
        let app = build_router(AppState::new(pool.clone(), model), BODY_LIMIT);
        Some(TestDb { app, pool, schema })
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(&self.app, method, uri, body).await
    }

    /// POST and return the created row, panicking unless the status is 201.
    pub async fn create(&self, collection: &str, body: Value) -> Value {
        let (status, json) = self
            .send(Method::POST, &format!("/api/v1/{}", collection), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create {}: {}", collection, json);
        json["data"].clone()
    }

    pub async fn list(&self, collection: &str) -> Vec<Value> {
        let (status, json) = self
            .send(Method::GET, &format!("/api/v1/{}", collection), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        json["data"].as_array().cloned().unwrap_or_default()
    }

    pub async fn count(&self, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM \"{}\".\"{}\"", self.schema, table))
            .fetch_one(&self.pool)
            .await
            .expect("count");
        n
    }

    pub async fn cleanup(self) {
        let _ = sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema))
            .execute(&self.pool)
            .await;
        self.pool.close().await;
    }
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");
    send_request(app, request).await
}

pub async fn send_request(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, json)
}
