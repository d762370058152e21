//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;
use tresor_core::{MockBackend, MockReply, ModelRef, RouterConfig};

fn setup_test_app(mock: &MockBackend) -> Router {
    let router = ModelRouter::with_config(RouterConfig::single_chain(
        vec![ModelRef::mock("primary"), ModelRef::mock("secondary")],
        Duration::from_secs(5),
    ));
    let config = ServerConfig {
        allowed_origins: vec![],
        default_currency: "XOF".to_string(),
    };
    let state = AppState::new(
        AIClient::mock(mock.clone()),
        &router,
        &PromptLibrary::embedded_only(),
        config,
    )
    .unwrap();
    create_router(Arc::new(state))
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn french_scenario() -> serde_json::Value {
    json!({
        "incomes": [{"description": "Salaire", "amount": 10000, "category": "Salaire", "date": "2024-07-28"}],
        "expenses": [{"description": "Pain", "amount": 500, "category": "Alimentation", "date": "2024-07-27"}],
        "newBudgets": [],
        "newSavingsGoals": [],
        "savingsContributions": []
    })
}

// ========== Extraction API Tests ==========

#[tokio::test]
async fn test_extract_text() {
    let mock = MockBackend::new().on("primary", MockReply::Json(french_scenario()));
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json(
            "/api/extract/text",
            json!({
                "text": "J'ai reçu mon salaire de 10000 aujourd'hui et j'ai acheté du pain à 500 hier",
                "currentDate": "2024-07-28"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["incomes"][0]["amount"], 10000.0);
    assert_eq!(json["expenses"][0]["category"], "Alimentation");
    assert!(json["newBudgets"].as_array().unwrap().is_empty());
    assert!(json["newSavingsGoals"].as_array().unwrap().is_empty());
    assert!(json["savingsContributions"].as_array().unwrap().is_empty());

    let prompt = &mock.calls()[0].prompt;
    assert!(prompt.contains("2024-07-28"));
    assert!(prompt.contains("XOF"));
}

#[tokio::test]
async fn test_extract_text_rejects_blank_text() {
    let mock = MockBackend::new();
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json("/api/extract/text", json!({"text": "   "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_extract_text_rejects_bad_date() {
    let mock = MockBackend::new();
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json(
            "/api/extract/text",
            json!({"text": "Pain 500", "currentDate": "28/07/2024"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "currentDate must be YYYY-MM-DD");
}

#[tokio::test]
async fn test_exhausted_chain_returns_generic_message() {
    let mock = MockBackend::new()
        .on("primary", MockReply::Fail("secret upstream detail".into()))
        .on("secondary", MockReply::Text("not json".into()));
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json("/api/extract/text", json!({"text": "Pain 500"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], PROCESSING_FAILED_MESSAGE);
    assert!(!json.to_string().contains("secret upstream detail"));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_extract_image_blank_transcript() {
    let mock = MockBackend::new().on("primary", MockReply::Text("  ".into()));
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json(
            "/api/extract/image",
            json!({"imageDataUri": "data:image/png;base64,iVBORw0K"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json["expenses"].as_array().unwrap().is_empty());
    assert!(json["incomes"].as_array().unwrap().is_empty());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_extract_image_rejects_non_data_uri() {
    let mock = MockBackend::new();
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json(
            "/api/extract/image",
            json!({"imageDataUri": "https://example.com/receipt.png"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mock.call_count(), 0);
}

// ========== Receipt API Tests ==========

#[tokio::test]
async fn test_scan_receipt() {
    let mock = MockBackend::new().on(
        "primary",
        MockReply::Json(json!({
            "merchant": "Pharmacie du Plateau",
            "amount": 4200,
            "date": "2024-07-26",
            "category": "santé"
        })),
    );
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json(
            "/api/receipts/scan",
            json!({"imageDataUri": "data:image/jpeg;base64,/9j/4AAQ"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["merchant"], "Pharmacie du Plateau");
    assert_eq!(json["amount"], 4200.0);
    assert_eq!(json["category"], "Santé");
}

// ========== Category API Tests ==========

#[tokio::test]
async fn test_list_categories() {
    let app = setup_test_app(&MockBackend::new());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/categories")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let income = json["income"].as_array().unwrap();
    assert!(income.iter().any(|c| c["name"] == "Salaire"));
    assert!(!json["expense"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_categorize() {
    let mock = MockBackend::new().on("primary", MockReply::Text("Transport".into()));
    let app = setup_test_app(&mock);

    let response = app
        .oneshot(post_json(
            "/api/categorize",
            json!({"description": "Taxi Cocody", "kind": "expense"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["category"]["name"], "Transport");
    assert_eq!(json["matched"], true);
    assert_eq!(json["model"], "mock/primary");
}

// ========== Health API Tests ==========

#[tokio::test]
async fn test_health() {
    let app = setup_test_app(&MockBackend::new());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["providers"][0]["provider"], "mock");
    assert_eq!(json["providers"][0]["healthy"], true);
}

#[tokio::test]
async fn test_security_headers() {
    let app = setup_test_app(&MockBackend::new());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/categories")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}
