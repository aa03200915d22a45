use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use sprout_api::api::{create_router, AppState};
use sprout_api::models::CatalogItem;
use sprout_api::services::{providers::InMemoryStore, EngineSettings, TemplateNarrativeClient};

fn product(id: i64) -> CatalogItem {
    CatalogItem {
        id,
        name: format!("Refillable Bottle {}", id),
        price: 18.0 + id as f64,
        brand: Some("Leaf".to_string()),
        category_id: Some(id % 3),
        category_name: Some("Kitchen".to_string()),
        in_stock: true,
        quantity: 10,
        created_at: Utc::now(),
    }
}

fn create_test_server(store: InMemoryStore) -> TestServer {
    let (state, _handle) = AppState::in_memory(
        Arc::new(store),
        Arc::new(TemplateNarrativeClient),
        EngineSettings::default(),
    );
    let app = create_router(state);
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(InMemoryStore::new());
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "healthy" }));
}

#[tokio::test]
async fn test_default_recommendation_count() {
    let store = InMemoryStore::new().with_products((1..=30).map(product).collect());
    let server = create_test_server(store);
    let user_id = Uuid::new_v4();

    let response = server
        .get(&format!("/api/v1/users/{}/recommendations", user_id))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["count"], 6);
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_small_catalog_is_padded_to_limit() {
    let store = InMemoryStore::new().with_products((1..=3).map(product).collect());
    let server = create_test_server(store);

    let response = server
        .get(&format!("/api/v1/users/{}/recommendations", Uuid::new_v4()))
        .add_query_param("limit", 6)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 6);

    let synthetic: Vec<&Value> = recommendations
        .iter()
        .filter(|r| r["source"] == "synthetic")
        .collect();
    assert_eq!(synthetic.len(), 3);
    assert!(synthetic.iter().all(|r| r["product"]["id"].is_null()));
    assert!(synthetic.iter().all(|r| r["tier"] == "BASIC"));
}

#[tokio::test]
async fn test_limit_out_of_range_is_rejected() {
    let server = create_test_server(InMemoryStore::new());
    let path = format!("/api/v1/users/{}/recommendations", Uuid::new_v4());

    server
        .get(&path)
        .add_query_param("limit", 0)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let response = server.get(&path).add_query_param("limit", 51).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("limit"));
}

#[tokio::test]
async fn test_malformed_user_id_is_rejected() {
    let server = create_test_server(InMemoryStore::new());
    let response = server.get("/api/v1/users/not-a-uuid/recommendations").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_explain_known_product() {
    let store = InMemoryStore::new().with_products(vec![product(4)]);
    let server = create_test_server(store);

    let response = server
        .get(&format!(
            "/api/v1/users/{}/recommendations/4/explain",
            Uuid::new_v4()
        ))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["product_id"], 4);
    assert!(body["narrative"]
        .as_str()
        .unwrap()
        .contains("Refillable Bottle 4"));
    let score = body["reasoning"]["final_score"].as_f64().unwrap();
    assert!((0.0..=10.0).contains(&score));
    assert!(!body["reasoning"]["factors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_explain_unknown_product_is_not_found() {
    let server = create_test_server(InMemoryStore::new());
    let response = server
        .get(&format!(
            "/api/v1/users/{}/recommendations/404/explain",
            Uuid::new_v4()
        ))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_interaction_is_accepted_and_eventually_visible() {
    let server = create_test_server(InMemoryStore::new());
    let user_id = Uuid::new_v4();

    server
        .get(&format!("/api/v1/users/{}/context", user_id))
        .await
        .assert_status_not_found();

    let response = server
        .post(&format!("/api/v1/users/{}/interactions", user_id))
        .json(&json!({
            "kind": "purchase",
            "product_id": 12,
            "category_id": 2,
            "brand": "Leaf",
            "sustainability_score": 80.0
        }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    response.assert_json(&json!({ "status": "accepted" }));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = server
        .get(&format!("/api/v1/users/{}/context", user_id))
        .await;
    response.assert_status_ok();
    let context: Value = response.json();
    assert_eq!(context["preferred_categories"], json!([2]));
    assert!(context["brand_loyalty"]["Leaf"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_malformed_interaction_is_rejected() {
    let server = create_test_server(InMemoryStore::new());
    let response = server
        .post(&format!("/api/v1/users/{}/interactions", Uuid::new_v4()))
        .json(&json!({ "kind": "teleport", "product_id": 1 }))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server(InMemoryStore::new());
    let response = server.get("/health").await;
    let request_id = response.header("x-request-id");
    assert!(!request_id.is_empty());
}
