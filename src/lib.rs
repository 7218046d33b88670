//! Tablekit: configuration-driven CRUD engine over PostgreSQL tables.
//!
//! Table definitions and model configs resolve into a [`ModelRegistry`]; the routes in
//! [`routes`] serve list, form spec and write endpoints for every registered model.

pub mod case;
pub mod config;
pub mod error;
pub mod field_id;
pub mod filters;
pub mod form;
pub mod handlers;
pub mod pagination;
pub mod relations;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use config::{ColumnDef, ModelConfig, ModelRegistry, RegistryConfig, ResolvedModel, TableDef};
pub use error::{AppError, ConfigError};
pub use field_id::FieldId;
pub use pagination::{PaginatedResponse, Pagination};
pub use routes::{common_routes, crud_routes, crud_routes_with_limit};
pub use service::CrudService;
pub use settings::{init_tracing, Settings};
pub use state::AppState;
