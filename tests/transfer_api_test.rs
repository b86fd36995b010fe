mod common;

use axum::http::{Method, StatusCode};
use common::{operator, TestApp};
use kirim_barang::entities::Location;
use serde_json::json;

#[tokio::test]
async fn health_and_status_respond() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["checks"]["database"], "healthy");

    let (status, body) = app.request(Method::GET, "/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "kirim-barang");
}

#[tokio::test]
async fn transfer_routes_require_operator_headers() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(Method::GET, "/api/v1/transfers", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.is_object());
}

#[tokio::test]
async fn mutations_answer_with_action_results() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;
    let a = operator(Location::A);
    let b = operator(Location::B);

    let (status, created) = app
        .request(
            Method::POST,
            "/api/v1/transfers",
            Some(&a),
            Some(json!({ "to_location": "B", "part_number": "BRK-001", "quantity": 4 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["success"], true);
    let id = created["id"].as_str().expect("created id").to_string();

    // Wrong side approving is a failed action, not an HTTP error
    let (status, refused) = app
        .request(Method::POST, &format!("/api/v1/transfers/{id}/approve"), Some(&b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refused["success"], false);
    assert_eq!(refused["code"], "unauthorized");

    let (_, approved) = app
        .request(
            Method::POST,
            &format!("/api/v1/transfers/{id}/approve"),
            Some(&a),
            Some(json!({ "quantity": 3 })),
        )
        .await;
    assert_eq!(approved["success"], true);

    let (_, sent) = app
        .request(Method::POST, &format!("/api/v1/transfers/{id}/send"), Some(&a), None)
        .await;
    assert_eq!(sent["success"], true);
    assert_eq!(app.stock(Location::A, "BRK-001").await, 7);

    let (status, fetched) = app
        .request(Method::GET, &format!("/api/v1/transfers/{id}"), Some(&b), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["status"], "sent");
    assert_eq!(fetched["data"]["sent_quantity"], 3);

    let (_, history) = app
        .request(Method::GET, &format!("/api/v1/transfers/{id}/history"), Some(&b), None)
        .await;
    assert_eq!(history["data"].as_array().map(Vec::len), Some(3));

    let (_, in_transit) = app
        .request(Method::GET, "/api/v1/transfers/in-transit", Some(&a), None)
        .await;
    assert_eq!(in_transit["data"][0]["quantity"], 3);
}

#[tokio::test]
async fn invalid_create_reports_validation_failure() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/transfers",
            Some(&operator(Location::A)),
            Some(json!({ "to_location": "A", "part_number": "BRK-001", "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn comparisons_fill_unknown_parts() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;
    app.seed(Location::B, "BRK-001", 2, Some("  ")).await;
    let a = operator(Location::A);

    let (status, stock) = app
        .request(
            Method::POST,
            "/api/v1/transfers/stock-comparison",
            Some(&a),
            Some(json!({ "part_numbers": ["BRK-001", "NOTFOUND", " BRK-001 ", ""] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let data = &stock["data"];
    assert_eq!(data.as_object().map(|m| m.len()), Some(2));
    assert_eq!(data["BRK-001"], json!({ "A": 10, "B": 2 }));
    assert_eq!(data["NOTFOUND"], json!({ "A": 0, "B": 0 }));

    let (_, shelves) = app
        .request(
            Method::POST,
            "/api/v1/transfers/shelf-comparison",
            Some(&a),
            Some(json!({ "part_numbers": ["BRK-001", "NOTFOUND"] })),
        )
        .await;
    assert_eq!(shelves["data"]["BRK-001"], json!({ "A": "R1", "B": "-" }));
    assert_eq!(shelves["data"]["NOTFOUND"], json!({ "A": "-", "B": "-" }));
}

#[tokio::test]
async fn candidates_and_listing_over_http() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, Some("R1")).await;
    let a = operator(Location::A);
    app.raise(Location::A, Location::B, "BRK-001", 2).await;

    let (_, candidates) = app
        .request(Method::GET, "/api/v1/transfers/candidates?q=brk", Some(&a), None)
        .await;
    assert_eq!(candidates["data"][0]["part_number"], "BRK-001");

    let (status, listed) = app
        .request(
            Method::GET,
            "/api/v1/transfers?status=pending&direction=outgoing",
            Some(&a),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(listed["data"][0]["stock"]["A"], 10);

    let (status, _) = app
        .request(Method::GET, "/api/v1/transfers?status=bogus", Some(&a), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_endpoint_exposes_transfer_counters() {
    let app = TestApp::new().await;
    app.seed(Location::A, "BRK-001", 10, None).await;
    app.raise(Location::A, Location::B, "BRK-001", 1).await;

    let response = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(response.0, StatusCode::OK);
}
