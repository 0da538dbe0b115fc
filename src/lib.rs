//! Donut shop: inventory and order management REST backend over PostgreSQL,
//! driven by a declarative schema config.

pub mod config;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_path, resolve, FullConfig, ResolvedEntity, ResolvedModel};
pub use error::{AppError, ConfigError, FieldErrors};
pub use migration::apply_migrations;
pub use routes::build_router;
pub use service::CrudService;
pub use settings::Settings;
pub use state::AppState;
pub use store::{connect, ensure_database_exists};
