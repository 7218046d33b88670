//! Demo server: users, posts, tags and comments served through a tablekit registry.
//!
//! Run from repo root: `cargo run -p demo-server` with `DATABASE_URL` set.
//! `TABLEKIT_REGISTRY=<path>` loads tables and models from a JSON file instead of the built-in set.

use axum::Router;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tablekit::config::{ColumnMode, FieldOverride, FilterField, ListField, ValidationRule};
use tablekit::filters::FilterKind;
use tablekit::{
    common_routes, crud_routes_with_limit, init_tracing, AppState, ColumnDef, ModelConfig, ModelRegistry, Settings,
    TableDef,
};
use tokio::net::TcpListener;

const SCHEMA: &str = include_str!("../schema.sql");

fn tables() -> Vec<TableDef> {
    vec![
        TableDef::new("users")
            .column(ColumnDef::new("id", "serial").primary_key())
            .column(ColumnDef::new("name", "text").not_null())
            .column(ColumnDef::new("email", "text").unique())
            .column(ColumnDef::new("active", "boolean").not_null().default_sql("true"))
            .column(ColumnDef::new("created_at", "timestamptz").not_null().default_sql("now()")),
        TableDef::new("posts")
            .column(ColumnDef::new("id", "serial").primary_key())
            .column(ColumnDef::new("title", "text").not_null())
            .column(
                ColumnDef::new("status", "post_status")
                    .not_null()
                    .default_sql("'draft'")
                    .enum_values(["draft", "published", "archived"]),
            )
            .column(ColumnDef::new("authorId", "integer"))
            .column(
                ColumnDef::new("createdAt", "bigint")
                    .not_null()
                    .default_sql("(extract(epoch from now()) * 1000)::bigint")
                    .mode(ColumnMode::TimestampMs),
            )
            .foreign_key("authorId", "users", "id"),
        TableDef::new("tags")
            .column(ColumnDef::new("id", "serial").primary_key())
            .column(ColumnDef::new("name", "text").not_null().unique())
            .column(ColumnDef::new("color", "text")),
        TableDef::new("post_tags")
            .column(ColumnDef::new("postId", "integer").not_null())
            .column(ColumnDef::new("tagId", "integer").not_null())
            .foreign_key("postId", "posts", "id")
            .foreign_key("tagId", "tags", "id"),
        TableDef::new("comments")
            .column(ColumnDef::new("id", "serial").primary_key())
            .column(ColumnDef::new("postId", "integer"))
            .column(ColumnDef::new("body", "text").not_null())
            .foreign_key("postId", "posts", "id"),
    ]
}

fn models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("users", "users")
            .search_field("name")
            .search_field("email")
            .field(FieldOverride::new("name").rules(ValidationRule {
                required: Some(true),
                max_length: Some(120),
                ..Default::default()
            }))
            .field(FieldOverride::new("email").rules(ValidationRule {
                format: Some("email".into()),
                ..Default::default()
            }))
            .field(FieldOverride::new("active")),
        ModelConfig::new("posts", "posts")
            .list_field(ListField::new("title"))
            .list_field(ListField::new("status"))
            .list_field(ListField::new("authorId.name").header("Author"))
            .list_field(ListField::new("createdAt").header("Created"))
            .list_field(ListField::new("headline").header("Headline").accessor(|row| {
                let title = row.get("title").and_then(Value::as_str).unwrap_or_default();
                let author = row.get("authorId__name").and_then(Value::as_str).unwrap_or("anonymous");
                Value::String(format!("{} by {}", title, author))
            }))
            .search_field("title")
            .search_field("authorId.name")
            .filter_field(FilterField::new("status"))
            .filter_field(FilterField::new("createdAt").kind(FilterKind::DateRange))
            .filter_field(FilterField::new("authorId"))
            .many_to_many("tags", "post_tags")
            .one_to_many("comments", "comments"),
        ModelConfig::new("tags", "tags").search_field("name"),
        ModelConfig::new("comments", "comments").search_field("body"),
    ]
}

fn load_registry(prefix: &str) -> Result<ModelRegistry, Box<dyn std::error::Error>> {
    match std::env::var("TABLEKIT_REGISTRY") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)?;
            Ok(ModelRegistry::from_json(&json, prefix)?)
        }
        Err(_) => Ok(ModelRegistry::build(tables(), models(), prefix)?),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("tablekit=info,demo_server=info");
    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    let registry = load_registry(&settings.api_prefix)?;
    let prefix = registry.prefix().to_string();
    let state = AppState::new(pool, registry);

    let crud = crud_routes_with_limit(state.clone(), settings.body_limit);
    let app = Router::new().merge(common_routes(state));
    // axum refuses to nest at the root.
    let app = if prefix.is_empty() { app.merge(crud) } else { app.nest(&prefix, crud) };

    let listener = TcpListener::bind(settings.bind).await?;
    tracing::info!("demo server listening on http://{}{}", listener.local_addr()?, prefix);
    axum::serve(listener, app).await?;
    Ok(())
}
