//! Donut shop server: settings from env, schema migration, then serve the REST API.

use donut_shop::{
    apply_migrations, build_router, connect, ensure_database_exists, load_from_path, resolve, AppState,
    FullConfig, Settings,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "donut_shop=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = connect(&settings).await?;

    let mut config = match &settings.config_path {
        Some(path) => load_from_path(path).await?,
        None => FullConfig::builtin()?,
    };
    if let Some(schema) = &settings.schema {
        config.schema = schema.clone();
    }
    apply_migrations(&pool, &config).await?;
    let model = resolve(&config)?;
    let app = build_router(AppState::new(pool, model), settings.body_limit);

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, schema = %config.schema, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
