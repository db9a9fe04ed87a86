use std::sync::{Arc, Mutex};

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use morph_server::{AppState, ServerConfig, create_app};
use serde_json::{Value, json};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const ROLE: HeaderName = HeaderName::from_static("x-morph-role");

fn admin() -> HeaderValue {
    HeaderValue::from_static("admin")
}

async fn server() -> TestServer {
    let config = ServerConfig::default();
    let platform = config.build_platform().await.unwrap();
    let app = create_app(AppState::new(platform, &config), config.cors_layer());
    TestServer::new(app).unwrap()
}

async fn define_blog(server: &TestServer) {
    let author = json!({
        "name": "author",
        "fields": [{"name": "name", "primitiveType": "string", "required": true}]
    });
    let post = json!({
        "name": "post",
        "fields": [
            {"name": "title", "primitiveType": "string"},
            {"name": "authors", "primitiveType": "array", "relationTarget": "author"}
        ]
    });
    for body in [author, post] {
        let response = server
            .post("/api/schemas")
            .add_header(ROLE, admin())
            .json(&body)
            .await;
        assert_eq!(response.status_code(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_health() {
    let server = server().await;
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], json!("ok"));
}

#[tokio::test]
async fn test_schema_admin_requires_admin_role() {
    let server = server().await;
    let response = server
        .post("/api/schemas")
        .json(&json!({"name": "note", "fields": []}))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], json!("authorization_denied"));

    let response = server.get("/api/schemas").add_header(ROLE, admin()).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>(), json!([]));
}

#[tokio::test]
async fn test_invalid_descriptor_and_duplicate() {
    let server = server().await;
    let bad = json!({
        "name": "post",
        "fields": [{"name": "tags", "primitiveType": "array"}]
    });
    let response = server
        .post("/api/schemas")
        .add_header(ROLE, admin())
        .json(&bad)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], json!("invalid_descriptor"));

    define_blog(&server).await;
    let response = server
        .post("/api/schemas")
        .add_header(ROLE, admin())
        .json(&json!({"name": "post", "fields": []}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_crud_round_trip_keeps_relations_in_step() {
    let server = server().await;
    define_blog(&server).await;

    let response = server
        .post("/api/entities/author")
        .add_header(ROLE, admin())
        .json(&json!({"name": "Alice"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let author_id = response.json::<Value>()["data"]["_id"].as_str().unwrap().to_string();

    let response = server
        .post("/api/entities/post")
        .add_header(ROLE, admin())
        .json(&json!({"title": "Hello", "authors": [author_id]}))
        .await;
    let body = response.json::<Value>();
    assert_eq!(body["relationSync"]["failures"], json!([]));
    let post_id = body["data"]["_id"].as_str().unwrap().to_string();

    // Guests may read.
    let response = server
        .get("/api/entities/author")
        .add_query_param("id", &author_id)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["posts"], json!([post_id]));

    let response = server
        .get("/api/entities/post")
        .add_query_param("search", "hell")
        .add_query_param("limit", 5)
        .await;
    let page = response.json::<Value>();
    assert_eq!(page["total"], json!(1));
    assert_eq!(page["limit"], json!(5));

    let response = server
        .put("/api/entities/post")
        .add_header(ROLE, admin())
        .json(&json!({"_id": post_id, "authors": []}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .get("/api/entities/author")
        .add_query_param("id", &author_id)
        .await;
    assert_eq!(response.json::<Value>()["posts"], json!([]));

    let response = server
        .delete("/api/entities/post")
        .add_query_param("id", &post_id)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let response = server
        .delete("/api/entities/post")
        .add_header(ROLE, admin())
        .add_query_param("id", &post_id)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_error_statuses() {
    let server = server().await;
    define_blog(&server).await;

    let response = server.get("/api/entities/ghost").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], json!("unknown_entity"));

    let response = server
        .post("/api/entities/author")
        .add_header(ROLE, admin())
        .json(&json!({}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], json!("validation_error"));

    let response = server
        .get("/api/entities/author")
        .add_query_param("id", "missing")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_last_administrator_conflict() {
    let server = server().await;
    let user = json!({
        "name": "user",
        "fields": [
            {"name": "email", "primitiveType": "string", "required": true},
            {"name": "role", "primitiveType": "string", "uiHint": "select", "enumValues": ["admin", "editor"]}
        ]
    });
    server
        .post("/api/schemas")
        .add_header(ROLE, admin())
        .json(&user)
        .await;

    let response = server
        .post("/api/entities/user")
        .add_header(ROLE, admin())
        .json(&json!({"email": "root@example.com", "role": "admin"}))
        .await;
    let id = response.json::<Value>()["data"]["_id"].as_str().unwrap().to_string();

    let response = server
        .delete("/api/entities/user")
        .add_header(ROLE, admin())
        .add_query_param("id", &id)
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], json!("invariant_violation"));
}

#[tokio::test]
async fn test_rename_schema() {
    let server = server().await;
    define_blog(&server).await;

    let response = server
        .post("/api/schemas/post/rename")
        .add_header(ROLE, admin())
        .json(&json!({"newName": "article"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .get("/api/schemas/article")
        .add_header(ROLE, admin())
        .await;
    assert_eq!(response.json::<Value>()["name"], json!("article"));
    let response = server.get("/api/schemas/post").add_header(ROLE, admin()).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

/// Records the name of every span opened while installed.
#[derive(Clone, Default)]
struct SpanNames(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for SpanNames {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        self.0.lock().unwrap().push(attrs.metadata().name().to_string());
    }
}

#[tokio::test]
async fn test_entity_routes_run_inside_the_execute_span() {
    let names = SpanNames::default();
    let _subscriber =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(names.clone()));

    let server = server().await;
    define_blog(&server).await;

    let response = server
        .post("/api/entities/author")
        .add_header(ROLE, admin())
        .json(&json!({"name": "Ada"}))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let id = response.json::<Value>()["data"]["_id"]
        .as_str()
        .unwrap()
        .to_string();

    server
        .get("/api/entities/author")
        .add_header(ROLE, admin())
        .await
        .assert_status_ok();
    server
        .put("/api/entities/author")
        .add_header(ROLE, admin())
        .json(&json!({"_id": id, "name": "Ada L."}))
        .await
        .assert_status_ok();
    server
        .delete("/api/entities/author")
        .add_header(ROLE, admin())
        .add_query_param("id", &id)
        .await
        .assert_status_ok();

    let executed = names
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|name| name.as_str() == "crud.execute")
        .count();
    assert_eq!(executed, 4);
}
