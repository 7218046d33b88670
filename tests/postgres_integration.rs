//! End-to-end scenarios against a real PostgreSQL database.
//!
//! Run with `TABLEKIT_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.
//! Each test works in its own throwaway schema.

use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use tablekit::config::{ColumnMode, FilterField, ListField};
use tablekit::{AppError, ColumnDef, CrudService, ModelConfig, ModelRegistry, TableDef};

struct TestDb {
    pool: PgPool,
    schema: String,
}

impl TestDb {
    async fn new() -> TestDb {
        let url = std::env::var("TABLEKIT_TEST_DATABASE_URL").expect("TABLEKIT_TEST_DATABASE_URL must be set");
        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
        let schema = format!("tk_{}", uuid::Uuid::new_v4().simple());
        let ddl = format!(
            r#"
            CREATE SCHEMA "{s}";
            CREATE TABLE "{s}".users (id serial PRIMARY KEY, name text NOT NULL, email text UNIQUE);
            CREATE TABLE "{s}".posts (
                id serial PRIMARY KEY,
                title text NOT NULL,
                status text NOT NULL DEFAULT 'draft',
                "authorId" integer REFERENCES "{s}".users (id),
                "createdAt" bigint NOT NULL DEFAULT 0
            );
            CREATE TABLE "{s}".tags (id serial PRIMARY KEY, name text NOT NULL UNIQUE, color text);
            CREATE TABLE "{s}".post_tags (
                "postId" integer NOT NULL REFERENCES "{s}".posts (id) ON DELETE CASCADE,
                "tagId" integer NOT NULL REFERENCES "{s}".tags (id),
                note text,
                PRIMARY KEY ("postId", "tagId")
            );
            CREATE TABLE "{s}".comments (
                id serial PRIMARY KEY,
                "postId" integer REFERENCES "{s}".posts (id),
                body text NOT NULL
            );
            CREATE TABLE "{s}".post_topics (
                "postId" integer NOT NULL REFERENCES "{s}".posts (id) ON DELETE CASCADE,
                "tagId" integer NOT NULL REFERENCES "{s}".tags (id),
                PRIMARY KEY ("postId", "tagId")
            );
            CREATE TABLE "{s}".reviews (
                id serial PRIMARY KEY,
                "postId" integer NOT NULL REFERENCES "{s}".posts (id),
                body text NOT NULL
            );
            "#,
            s = schema
        );
        sqlx::raw_sql(&ddl).execute(&pool).await.unwrap();
        TestDb { pool, schema }
    }

    fn registry(&self) -> ModelRegistry {
        let s = self.schema.as_str();
        let tables = vec![
            TableDef::new("users")
                .schema(s)
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text").not_null())
                .column(ColumnDef::new("email", "text").unique()),
            TableDef::new("posts")
                .schema(s)
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("title", "text").not_null())
                .column(ColumnDef::new("status", "text").not_null().default_sql("'draft'"))
                .column(ColumnDef::new("authorId", "integer"))
                .column(
                    ColumnDef::new("createdAt", "bigint")
                        .not_null()
                        .default_sql("0")
                        .mode(ColumnMode::TimestampMs),
                )
                .foreign_key("authorId", "users", "id"),
            TableDef::new("tags")
                .schema(s)
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("name", "text").not_null().unique())
                .column(ColumnDef::new("color", "text")),
            TableDef::new("post_tags")
                .schema(s)
                .column(ColumnDef::new("postId", "integer").not_null())
                .column(ColumnDef::new("tagId", "integer").not_null())
                .column(ColumnDef::new("note", "text"))
                .foreign_key("postId", "posts", "id")
                .foreign_key("tagId", "tags", "id"),
            TableDef::new("comments")
                .schema(s)
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("postId", "integer"))
                .column(ColumnDef::new("body", "text").not_null())
                .foreign_key("postId", "posts", "id"),
            TableDef::new("post_topics")
                .schema(s)
                .column(ColumnDef::new("postId", "integer").not_null())
                .column(ColumnDef::new("tagId", "integer").not_null())
                .foreign_key("postId", "posts", "id")
                .foreign_key("tagId", "tags", "id"),
            TableDef::new("reviews")
                .schema(s)
                .column(ColumnDef::new("id", "serial").primary_key())
                .column(ColumnDef::new("postId", "integer").not_null())
                .column(ColumnDef::new("body", "text").not_null())
                .foreign_key("postId", "posts", "id"),
        ];
        let models = vec![
            ModelConfig::new("users", "users"),
            ModelConfig::new("tags", "tags"),
            ModelConfig::new("posts", "posts")
                .list_field(ListField::new("title"))
                .list_field(ListField::new("authorId.name"))
                .search_field("title")
                .filter_field(FilterField::new("status"))
                .filter_field(FilterField::new("createdAt"))
                .many_to_many("tags", "post_tags")
                .one_to_many("comments", "comments")
                .many_to_many("topics", "post_topics")
                .one_to_many("reviews", "reviews"),
        ];
        ModelRegistry::build(tables, models, "/api").unwrap()
    }

    async fn create(&self, reg: &ModelRegistry, label: &str, body: Value) -> i64 {
        let model = reg.model(label).unwrap();
        let row = CrudService::create(&self.pool, reg, model, body).await.unwrap();
        row["id"].as_i64().unwrap()
    }

    async fn list(&self, reg: &ModelRegistry, label: &str, query: &[(&str, &str)]) -> (Vec<Value>, u64) {
        let model = reg.model(label).unwrap();
        let query: HashMap<String, String> = query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let res = CrudService::list(&self.pool, reg, model, &query).await.unwrap();
        (res.results.into_iter().map(Value::Object).collect(), res.pagination.count)
    }

    async fn teardown(self) {
        sqlx::raw_sql(&format!(r#"DROP SCHEMA "{}" CASCADE"#, self.schema))
            .execute(&self.pool)
            .await
            .unwrap();
    }
}

fn local_millis(y: i32, m: u32, d: u32, h: u32) -> i64 {
    Local.with_ymd_and_hms(y, m, d, h, 0, 0).earliest().unwrap().timestamp_millis()
}

#[tokio::test]
#[ignore]
async fn test_create_then_list_tags() {
    let db = TestDb::new().await;
    let reg = db.registry();
    db.create(&reg, "tags", json!({"name": "Tag 1", "color": "red"})).await;

    let (rows, count) = db.list(&reg, "tags", &[]).await;
    assert_eq!(count, 1);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Tag 1");
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_count_is_independent_of_page() {
    let db = TestDb::new().await;
    let reg = db.registry();
    for name in ["a", "b", "c"] {
        db.create(&reg, "tags", json!({ "name": name })).await;
    }
    let (rows, count) = db.list(&reg, "tags", &[("size", "2"), ("page", "2")]).await;
    assert_eq!(count, 3);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "c");
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_joined_column_projection_and_sort() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let ann = db.create(&reg, "users", json!({"name": "Ann"})).await;
    let bob = db.create(&reg, "users", json!({"name": "Bob"})).await;
    db.create(&reg, "posts", json!({"title": "first", "authorId": bob})).await;
    db.create(&reg, "posts", json!({"title": "second", "authorId": ann})).await;

    let (rows, _) = db.list(&reg, "posts", &[("ordering", "authorId__name:asc")]).await;
    assert_eq!(rows[0]["authorId__name"], "Ann");
    assert_eq!(rows[0]["title"], "second");
    assert!(rows[0].get("authorId").is_none());
    assert_eq!(rows[1]["authorId__name"], "Bob");
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_single_day_filter_on_millisecond_column() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let day = local_millis(2025, 7, 8, 0);
    for (title, status, at) in [
        ("early", "published", day),
        ("late", "published", local_millis(2025, 7, 8, 23) + 59 * 60 * 1000 + 59_000),
        ("draft", "draft", local_millis(2025, 7, 8, 12)),
        ("next day", "published", local_millis(2025, 7, 9, 0)),
    ] {
        db.create(&reg, "posts", json!({"title": title, "status": status, "createdAt": at}))
            .await;
    }

    let (rows, count) = db
        .list(&reg, "posts", &[("status", "published"), ("createdAt", "2025-07-08")])
        .await;
    assert_eq!(count, 2);
    let titles: Vec<&str> = rows.iter().map(|r| r["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["early", "late"]);
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_many_to_many_sync_is_idempotent_and_clears() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let posts = reg.model("posts").unwrap();
    let t1 = db.create(&reg, "tags", json!({"name": "one"})).await;
    let t2 = db.create(&reg, "tags", json!({"name": "two"})).await;
    let t3 = db.create(&reg, "tags", json!({"name": "three"})).await;
    let post = db
        .create(&reg, "posts", json!({"title": "p", "___tags___tagId": [t1, t2]}))
        .await;
    let lookup = post.to_string();

    let note_sql = format!(
        r#"UPDATE "{}".post_tags SET note = 'keep' WHERE "postId" = $1 AND "tagId" = $2"#,
        db.schema
    );
    sqlx::query(&note_sql)
        .bind(post as i32)
        .bind(t1 as i32)
        .execute(&db.pool)
        .await
        .unwrap();

    for _ in 0..2 {
        CrudService::update(&db.pool, &reg, posts, &lookup, json!({"___tags___tagId": [t1, t3]}))
            .await
            .unwrap();
    }
    let spec = CrudService::form_spec(&db.pool, &reg, posts, Some(&lookup)).await.unwrap();
    let mut members: Vec<i64> = spec.values["___tags___tagId"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    members.sort();
    assert_eq!(members, vec![t1, t3]);

    let note_query = format!(
        r#"SELECT note FROM "{}".post_tags WHERE "postId" = $1 AND "tagId" = $2"#,
        db.schema
    );
    let note: Option<String> = sqlx::query_scalar(&note_query)
        .bind(post as i32)
        .bind(t1 as i32)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(note.as_deref(), Some("keep"));

    CrudService::update(&db.pool, &reg, posts, &lookup, json!({"___tags___tagId": []}))
        .await
        .unwrap();
    let spec = CrudService::form_spec(&db.pool, &reg, posts, Some(&lookup)).await.unwrap();
    assert_eq!(spec.values["___tags___tagId"], json!([]));
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_one_to_many_unset_excluded_children() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let posts = reg.model("posts").unwrap();
    let post = db.create(&reg, "posts", json!({"title": "p"})).await;
    let insert = format!(
        r#"INSERT INTO "{}".comments ("postId", body) VALUES ($1, $2) RETURNING id"#,
        db.schema
    );
    let mut comments = Vec::new();
    for body in ["keep", "drop"] {
        let id: i32 = sqlx::query_scalar(&insert)
            .bind(post as i32)
            .bind(body)
            .fetch_one(&db.pool)
            .await
            .unwrap();
        comments.push(id);
    }

    CrudService::update(
        &db.pool,
        &reg,
        posts,
        &post.to_string(),
        json!({"___o2m___comments___id": [comments[0]]}),
    )
    .await
    .unwrap();

    let parent_query = format!(r#"SELECT "postId" FROM "{}".comments WHERE id = $1"#, db.schema);
    let kept: Option<i32> = sqlx::query_scalar(&parent_query)
        .bind(comments[0])
        .fetch_one(&db.pool)
        .await
        .unwrap();
    let dropped: Option<i32> = sqlx::query_scalar(&parent_query)
        .bind(comments[1])
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(kept, Some(post as i32));
    assert_eq!(dropped, None);
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_two_column_junction_is_replaced() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let posts = reg.model("posts").unwrap();
    let topics = posts.many_to_many.iter().find(|r| r.name == "topics").unwrap();
    assert!(!topics.has_extra_columns());
    let t1 = db.create(&reg, "tags", json!({"name": "one"})).await;
    let t2 = db.create(&reg, "tags", json!({"name": "two"})).await;
    let t3 = db.create(&reg, "tags", json!({"name": "three"})).await;
    let post = db
        .create(&reg, "posts", json!({"title": "p", "___topics___tagId": [t1, t2]}))
        .await;
    let lookup = post.to_string();

    let members_sql = format!(
        r#"SELECT "tagId" FROM "{}".post_topics WHERE "postId" = $1 ORDER BY "tagId""#,
        db.schema
    );
    for _ in 0..2 {
        CrudService::update(&db.pool, &reg, posts, &lookup, json!({"___topics___tagId": [t3, t2, t3]}))
            .await
            .unwrap();
        let members: Vec<i32> = sqlx::query_scalar(&members_sql)
            .bind(post as i32)
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(members, vec![t2 as i32, t3 as i32]);
    }

    CrudService::update(&db.pool, &reg, posts, &lookup, json!({"___topics___tagId": []}))
        .await
        .unwrap();
    let members: Vec<i32> = sqlx::query_scalar(&members_sql)
        .bind(post as i32)
        .fetch_all(&db.pool)
        .await
        .unwrap();
    assert!(members.is_empty());
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_detaching_required_child_is_relation_constraint() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let posts = reg.model("posts").unwrap();
    let post = db.create(&reg, "posts", json!({"title": "before"})).await;
    let insert = format!(
        r#"INSERT INTO "{}".reviews ("postId", body) VALUES ($1, 'fine') RETURNING id"#,
        db.schema
    );
    let review: i32 = sqlx::query_scalar(&insert)
        .bind(post as i32)
        .fetch_one(&db.pool)
        .await
        .unwrap();

    let err = CrudService::update(
        &db.pool,
        &reg,
        posts,
        &post.to_string(),
        json!({"title": "after", "___o2m___reviews___id": []}),
    )
    .await
    .unwrap_err();
    match err {
        AppError::RelationConstraint { relation, .. } => assert_eq!(relation, "reviews"),
        other => panic!("expected relation constraint, got {:?}", other),
    }

    let row = CrudService::read(&db.pool, posts, &post.to_string()).await.unwrap();
    assert_eq!(row["title"], "before");
    let parent_query = format!(r#"SELECT "postId" FROM "{}".reviews WHERE id = $1"#, db.schema);
    let parent: i32 = sqlx::query_scalar(&parent_query)
        .bind(review)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(parent, post as i32);
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_failed_relation_sync_rolls_back_parent() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let posts = reg.model("posts").unwrap();
    let res = CrudService::create(&db.pool, &reg, posts, json!({"title": "orphan", "___tags___tagId": [999]})).await;
    assert!(res.is_err());
    let (_, count) = db.list(&reg, "posts", &[]).await;
    assert_eq!(count, 0);
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_unique_violation_is_conflict() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let tags = reg.model("tags").unwrap();
    db.create(&reg, "tags", json!({"name": "dup"})).await;
    let err = CrudService::create(&db.pool, &reg, tags, json!({"name": "dup"}))
        .await
        .unwrap_err();
    match err {
        AppError::Conflict(msg) => assert!(msg.contains("name")),
        other => panic!("expected conflict, got {:?}", other),
    }
    db.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_delete_referenced_record_is_conflict() {
    let db = TestDb::new().await;
    let reg = db.registry();
    let users = reg.model("users").unwrap();
    let ann = db.create(&reg, "users", json!({"name": "Ann"})).await;
    db.create(&reg, "posts", json!({"title": "p", "authorId": ann})).await;
    let err = CrudService::delete(&db.pool, users, &ann.to_string()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    db.teardown().await;
}
