use super::*;

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    patched: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn handle_product_search(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let title = query.get("title").cloned().unwrap_or_default();
    state.queries.lock().await.push(query);
    if title == "boom" {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": "search index offline" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "products": [
                { "_id": "p1", "title": format!("{title} lamp"), "price": 12.5, "image": "lamp.png" }
            ],
            "total": 7
        })),
    )
}

async fn handle_orders(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.queries.lock().await.push(query);
    Json(json!({ "data": [], "total": -3 }))
}

async fn handle_jwt(Json(body): Json<Value>) -> Json<Value> {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email == "nobody@example.com" {
        return Json(json!({}));
    }
    Json(json!({ "token": format!("token-for-{email}") }))
}

async fn handle_user(
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match query.get("email").map(String::as_str) {
        Some("nadia@example.com") => Ok(Json(json!({
            "_id": "user-1",
            "email": "nadia@example.com",
            "status": "pending",
            "fName": "Nadia",
            "lName": "Rahman"
        }))),
        _ => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "user not found" })),
        )),
    }
}

async fn handle_me(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.auth_headers.lock().await.push(auth.clone());
    match auth.as_deref() {
        Some("Bearer token-for-nadia@example.com") => Ok(Json(json!({
            "_id": "user-1",
            "email": "nadia@example.com",
            "status": "active"
        }))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn handle_patch_user(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.patched.lock().await.push((id, body));
    StatusCode::OK
}

async fn handle_logout() -> StatusCode {
    StatusCode::OK
}

async fn spawn_storefront_server() -> anyhow::Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/products/search", get(handle_product_search))
        .route("/api/orders", get(handle_orders))
        .route("/api/jwt", post(handle_jwt))
        .route("/api/users", get(handle_user))
        .route("/api/users/me", get(handle_me))
        .route("/api/users/:id", axum::routing::patch(handle_patch_user))
        .route("/api/logout", get(handle_logout))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

fn client_for(base: &str) -> StorefrontApi {
    let settings = Settings {
        api_base_url: base.to_string(),
        ..Settings::default()
    };
    StorefrontApi::new(&settings).expect("client")
}

#[tokio::test]
async fn product_search_sends_term_limit_and_page() {
    let (base, state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);

    let page = api
        .search_products("desk", 1, 10)
        .await
        .expect("search succeeds");
    assert_eq!(page.total, 7);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].title, "desk lamp");

    let queries = state.queries.lock().await;
    assert_eq!(queries[0].get("title").map(String::as_str), Some("desk"));
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("10"));
    assert_eq!(queries[0].get("page").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn rejected_search_carries_status_and_server_message() {
    let (base, _state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);

    let err = api
        .search_products("boom", 1, 10)
        .await
        .expect_err("server rejects");
    assert_eq!(
        err,
        LookupError::Rejected {
            status: 503,
            message: "search index offline".to_string(),
        }
    );
}

#[tokio::test]
async fn order_search_goes_through_backend_trait() {
    let (base, state) = spawn_storefront_server().await.expect("spawn server");
    let api = Arc::new(client_for(&base));
    let backend = OrderSearch::new(api, UserId::from("user-1"), "nadia@example.com");

    let page = backend.search("shoes", 2, 10).await.expect("orders");
    assert_eq!(page.total, 3, "negative totals are taken as magnitude");
    assert!(page.items.is_empty());

    let queries = state.queries.lock().await;
    assert_eq!(queries[0].get("userId").map(String::as_str), Some("user-1"));
    assert_eq!(queries[0].get("search").map(String::as_str), Some("shoes"));
    assert_eq!(queries[0].get("page").map(String::as_str), Some("2"));
    assert!(!queries[0].contains_key("limit"));
}

#[tokio::test]
async fn jwt_is_stored_and_sent_as_bearer() {
    let (base, state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);

    assert_eq!(
        api.current_session().await.expect("no token"),
        None,
        "no request without a token"
    );
    assert!(state.auth_headers.lock().await.is_empty());

    let token = api.create_jwt("nadia@example.com").await.expect("jwt");
    assert_eq!(token.as_deref(), Some("token-for-nadia@example.com"));
    assert!(api.has_token().await);

    let session = api
        .current_session()
        .await
        .expect("session lookup")
        .expect("session present");
    assert_eq!(session.email, "nadia@example.com");

    api.logout().await.expect("logout");
    assert!(!api.has_token().await);
}

#[tokio::test]
async fn jwt_without_token_leaves_client_unauthenticated() {
    let (base, _state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);
    assert_eq!(api.create_jwt("nobody@example.com").await.expect("jwt"), None);
    assert!(!api.has_token().await);
}

#[tokio::test]
async fn rejected_token_reads_as_no_session() {
    let (base, _state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);
    api.set_token(Some("stale".to_string())).await;
    assert_eq!(api.current_session().await.expect("lookup"), None);
}

#[tokio::test]
async fn get_user_maps_not_found_to_none() {
    let (base, _state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);

    let record = api
        .get_user("nadia@example.com")
        .await
        .expect("lookup")
        .expect("record");
    assert_eq!(record.into_session().status.to_string(), "pending");

    assert!(api
        .get_user("ghost@example.com")
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn profile_update_patches_user_by_id() {
    let (base, state) = spawn_storefront_server().await.expect("spawn server");
    let api = client_for(&base);

    let update = ProfileUpdate {
        photo: "n.png".to_string(),
        fields: [("fName".to_string(), "Nadia".to_string())]
            .into_iter()
            .collect(),
    };
    api.update_user(&UserId::from("user-1"), &update)
        .await
        .expect("patch");

    let patched = state.patched.lock().await;
    assert_eq!(patched[0].0, "user-1");
    assert_eq!(patched[0].1, json!({ "photo": "n.png", "fName": "Nadia" }));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");

    let api = client_for(&format!("http://{addr}"));
    let err = api
        .search_products("desk", 1, 10)
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, LookupError::Transport(_)));
}
