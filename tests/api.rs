//! End-to-end tests for the records API, driven through the router with
//! `oneshot` against a temporary store.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use travel_records::config::AppConfig;
use travel_records::rest::create_router;
use travel_records::storage::Storage;

const ABSENT_ID: &str = "0123456789abcdef01234567";

fn app() -> Router {
    let storage = Storage::temporary().expect("temporary storage");
    create_router(&AppConfig::default(), storage)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router, username: &str) -> String {
    let response = send(
        app,
        "POST",
        "/api/login",
        None,
        Some(json!({"username": username, "password": "password"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
}

async fn create_trip(app: &Router, token: &str, body: Value) -> Value {
    let response = send(app, "POST", "/api/records", Some(token), Some(body)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

// -- Login -------------------------------------------------------------------

#[tokio::test]
async fn login_issues_token_for_known_user() {
    let app = app();
    let token = login(&app, "Alice").await;
    assert_eq!(token.split('.').count(), 3);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = app();
    let response = send(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({"username": "Alice", "password": "nope"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_missing_body() {
    let app = app();
    let response = send(&app, "POST", "/api/login", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// -- Access control ----------------------------------------------------------

#[tokio::test]
async fn records_require_a_token() {
    let app = app();
    let response = send(&app, "GET", "/api/records", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

    let response = send(&app, "GET", "/api/records", Some("not.a.token"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let other = AppConfig {
        jwt_secret: "another secret".to_string(),
        ..AppConfig::default()
    };
    let foreign = create_router(&other, Storage::temporary().unwrap());
    let token = login(&foreign, "Alice").await;

    let response = send(&app(), "GET", "/api/records", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_requires_admin_role() {
    let app = app();
    let bob = login(&app, "Bob").await;
    let created = create_trip(&app, &bob, json!({"name": "Trip", "from": "NYC", "to": "LA"})).await;
    let id = created["meta"].as_str().unwrap();

    let response = send(&app, "DELETE", &format!("/api/records/{}", id), Some(&bob), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Record is untouched.
    let uri = format!("/api/records?filter%5B_id%5D={}", id.to_ascii_uppercase());
    let listing = body_json(send(&app, "GET", &uri, Some(&bob), None).await).await;
    assert_eq!(listing["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_without_token_is_unauthenticated() {
    let app = app();
    let response = send(&app, "DELETE", &format!("/api/records/{}", ABSENT_ID), None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// -- Create ------------------------------------------------------------------

#[tokio::test]
async fn create_reports_every_missing_field() {
    let app = app();
    let token = login(&app, "Bob").await;

    let response = send(&app, "POST", "/api/records", Some(&token), Some(json!({"days": 3}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    let paths: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["name", "from", "to"]);
    assert_eq!(body["errors"][0]["location"], "body");
    assert_eq!(body["errors"][0]["msg"], "Invalid value");
}

#[tokio::test]
async fn create_rejects_empty_required_field() {
    let app = app();
    let token = login(&app, "Bob").await;

    let response = send(
        &app,
        "POST",
        "/api/records",
        Some(&token),
        Some(json!({"name": "", "from": "NYC", "to": "LA"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"][0]["path"], "name");
    assert_eq!(body["errors"][0]["value"], "");
}

#[tokio::test]
async fn create_then_filter_by_name() {
    let app = app();
    let token = login(&app, "Bob").await;

    let response = send(
        &app,
        "POST",
        "/api/records",
        Some(&token),
        Some(json!({"name": "Trip", "from": "NYC", "to": "LA"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let created = body_json(response).await;
    let id = created["meta"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 24);
    assert_eq!(location, format!("/api/records/{}", id));
    assert_eq!(created["data"]["_id"], id.as_str());

    create_trip(&app, &token, json!({"name": "Other", "from": "SF", "to": "LA"})).await;

    let uri = "/api/records?filter%5Bname%5D=Trip";
    let response = send(&app, "GET", uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;

    let data = listing["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["name"], "Trip");
    assert_eq!(data[0]["_id"], id.as_str());
    assert_eq!(listing["meta"]["filter"], json!({"name": "Trip"}));
    assert_eq!(listing["meta"]["page"], 1);
    assert_eq!(listing["meta"]["skip"], 0);
    assert_eq!(listing["meta"]["limit"], 10);
    assert_eq!(listing["meta"]["total"], 1);
    assert_eq!(listing["links"]["self"], uri);
}

#[tokio::test]
async fn client_supplied_id_is_ignored_on_create() {
    let app = app();
    let token = login(&app, "Bob").await;
    let created = create_trip(
        &app,
        &token,
        json!({"_id": ABSENT_ID, "name": "Trip", "from": "NYC", "to": "LA"}),
    )
    .await;
    assert_ne!(created["meta"], ABSENT_ID);
}

// -- List --------------------------------------------------------------------

#[tokio::test]
async fn list_paginates_by_ten() {
    let app = app();
    let token = login(&app, "Bob").await;
    for i in 0..12 {
        create_trip(&app, &token, json!({"name": format!("t{i}"), "from": "A", "to": "B"})).await;
    }

    let first = body_json(send(&app, "GET", "/api/records", Some(&token), None).await).await;
    assert_eq!(first["data"].as_array().unwrap().len(), 10);
    assert_eq!(first["meta"]["total"], 10);

    let second = body_json(send(&app, "GET", "/api/records?page=2", Some(&token), None).await).await;
    assert_eq!(second["data"].as_array().unwrap().len(), 2);
    assert_eq!(second["meta"]["skip"], 10);
    assert_eq!(second["meta"]["page"], 2);

    let fallback = body_json(send(&app, "GET", "/api/records?page=abc", Some(&token), None).await).await;
    assert_eq!(fallback["meta"]["page"], 1);
    assert_eq!(fallback["meta"]["skip"], 0);
}

#[tokio::test]
async fn list_beyond_last_page_is_empty() {
    let app = app();
    let token = login(&app, "Bob").await;
    create_trip(&app, &token, json!({"name": "Trip", "from": "A", "to": "B"})).await;

    let response = send(&app, "GET", "/api/records?page=9223372036854775807", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert!(listing["data"].as_array().unwrap().is_empty());
    assert_eq!(listing["meta"]["page"], i64::MAX);
}

#[tokio::test]
async fn list_sorts_with_coerced_directions() {
    let app = app();
    let token = login(&app, "Bob").await;
    for from in ["B", "C", "A"] {
        create_trip(&app, &token, json!({"name": "Trip", "from": from, "to": "X"})).await;
    }

    let uri = "/api/records?sort%5Bfrom%5D=-1";
    let listing = body_json(send(&app, "GET", uri, Some(&token), None).await).await;
    let froms: Vec<&str> = listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["from"].as_str().unwrap())
        .collect();
    assert_eq!(froms, vec!["C", "B", "A"]);
    assert_eq!(listing["meta"]["sort"], json!({"from": -1}));

    let uri = "/api/records?sort%5Bfrom%5D=sideways";
    let listing = body_json(send(&app, "GET", uri, Some(&token), None).await).await;
    assert_eq!(listing["meta"]["sort"], json!({"from": null}));
    assert_eq!(listing["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_filter_operator_is_a_server_error() {
    let app = app();
    let token = login(&app, "Bob").await;
    let uri = "/api/records?filter%5Bname%5D%5B%24where%5D=1";
    let response = send(&app, "GET", uri, Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// -- Upsert / patch ----------------------------------------------------------

#[tokio::test]
async fn put_replaces_existing_record() {
    let app = app();
    let token = login(&app, "Bob").await;
    let created = create_trip(&app, &token, json!({"name": "Trip", "from": "NYC", "to": "LA", "days": 4})).await;
    let id = created["meta"].as_str().unwrap();

    let response = send(
        &app,
        "PUT",
        &format!("/api/records/{}", id),
        Some(&token),
        Some(json!({"name": "Trip", "from": "NYC", "to": "SF"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["meta"]["_id"], id);
    assert_eq!(body["data"], json!({"_id": id, "name": "Trip", "from": "NYC", "to": "SF"}));
}

#[tokio::test]
async fn put_on_absent_id_creates_new_record() {
    let app = app();
    let token = login(&app, "Bob").await;

    let response = send(
        &app,
        "PUT",
        &format!("/api/records/{}", ABSENT_ID),
        Some(&token),
        Some(json!({"name": "Fresh", "from": "A", "to": "B"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let new_id = body["meta"]["_id"].as_str().unwrap();
    assert_eq!(new_id.len(), 24);
    assert_eq!(body["data"]["name"], "Fresh");
}

#[tokio::test]
async fn patch_merges_and_is_idempotent() {
    let app = app();
    let token = login(&app, "Bob").await;
    let created = create_trip(&app, &token, json!({"name": "Trip", "from": "NYC", "to": "LA"})).await;
    let uri = format!("/api/records/{}", created["meta"].as_str().unwrap());

    let first = send(&app, "PATCH", &uri, Some(&token), Some(json!({"days": 2}))).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["data"]["days"], 2);
    assert_eq!(first["data"]["name"], "Trip");

    let second = body_json(send(&app, "PATCH", &uri, Some(&token), Some(json!({"days": 2}))).await).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn patch_on_absent_id_is_not_found() {
    let app = app();
    let token = login(&app, "Bob").await;
    let uri = format!("/api/records/{}", ABSENT_ID);
    let response = send(&app, "PATCH", &uri, Some(&token), Some(json!({"days": 2}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_id_is_a_validation_error() {
    let app = app();
    let alice = login(&app, "Alice").await;

    for method in ["PUT", "PATCH", "DELETE"] {
        let response = send(&app, method, "/api/records/not-an-id", Some(&alice), Some(json!({}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method}");
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["location"], "params");
        assert_eq!(body["errors"][0]["path"], "id");
        assert_eq!(body["errors"][0]["value"], "not-an-id");
    }
}

// -- Delete ------------------------------------------------------------------

#[tokio::test]
async fn admin_deletes_record() {
    let app = app();
    let alice = login(&app, "Alice").await;
    let created = create_trip(&app, &alice, json!({"name": "Trip", "from": "NYC", "to": "LA"})).await;
    let id = created["meta"].as_str().unwrap();

    let response = send(&app, "DELETE", &format!("/api/records/{}", id), Some(&alice), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let uri = format!("/api/records?filter%5B_id%5D={}", id);
    let listing = body_json(send(&app, "GET", &uri, Some(&alice), None).await).await;
    assert_eq!(listing["data"].as_array().unwrap().len(), 0);
    assert_eq!(listing["meta"]["total"], 0);

    let again = send(&app, "DELETE", &format!("/api/records/{}", id), Some(&alice), None).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_on_absent_id_is_not_found() {
    let app = app();
    let alice = login(&app, "Alice").await;
    let response = send(&app, "DELETE", &format!("/api/records/{}", ABSENT_ID), Some(&alice), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
