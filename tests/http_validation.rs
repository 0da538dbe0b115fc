//! Request handling that completes before any storage access.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{offline_app, send, send_request, BODY_LIMIT};
use serde_json::json;

#[tokio::test]
async fn health_and_version() {
    let app = offline_app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, body) = send(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "donut-shop");
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let app = offline_app();
    let (status, body) = send(&app, Method::GET, "/api/v1/muffin", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = send(&app, Method::POST, "/api/v1/muffin", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn negative_price_is_rejected_with_field_detail() {
    let app = offline_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/donut",
        Some(json!({"name": "Glazed", "price": "-1.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(
        body["error"]["details"]["price"],
        json!(["Ensure this value is greater than or equal to 0."])
    );
}

#[tokio::test]
async fn rating_must_be_between_one_and_five() {
    let app = offline_app();
    for rating in [0, 6] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/review",
            Some(json!({"customer_id": 1, "donut_id": 1, "rating": rating})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "rating {}", rating);
        assert!(body["error"]["details"]["rating"].is_array());
    }
}

#[tokio::test]
async fn missing_fields_are_reported_together() {
    let app = offline_app();
    let (status, body) = send(&app, Method::POST, "/api/v1/customer", Some(json!({"email": "nope"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details = &body["error"]["details"];
    assert_eq!(details["first_name"], json!(["This field is required."]));
    assert_eq!(details["last_name"], json!(["This field is required."]));
    assert_eq!(details["email"], json!(["Enter a valid email address."]));
}

#[tokio::test]
async fn nested_reference_on_write_is_rejected() {
    let app = offline_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/recipe",
        Some(json!({"donut_id": 1, "ingredient_id": {"id": 2}, "quantity": "1.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["details"]["ingredient_id"].is_array());
}

#[tokio::test]
async fn patch_validates_only_present_fields() {
    let app = offline_app();
    let (status, body) = send(&app, Method::PATCH, "/api/v1/donut/1", Some(json!({"price": -5}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let details = body["error"]["details"].as_object().cloned().unwrap_or_default();
    assert_eq!(details.keys().collect::<Vec<_>>(), vec!["price"]);
}

#[tokio::test]
async fn put_requires_full_representation() {
    let app = offline_app();
    let (status, body) = send(&app, Method::PUT, "/api/v1/donut/1", Some(json!({"price": "2.00"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"]["name"], json!(["This field is required."]));
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let app = offline_app();

    let (status, body) = send(&app, Method::GET, "/api/v1/donut/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = send(&app, Method::POST, "/api/v1/donut", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/donut")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let (status, _) = send_request(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn body_without_json_content_type_is_unsupported() {
    let app = offline_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/donut")
        .body(Body::from("{\"name\": \"Glazed\", \"price\": \"1.00\"}"))
        .unwrap();
    let (status, body) = send_request(&app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], "unsupported_media_type");
}

#[tokio::test]
async fn null_character_in_text_is_a_field_error() {
    let app = offline_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/donut",
        Some(json!({"name": "q", "price": "9999.99", "description": "\u{0}"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["error"]["details"]["description"],
        json!(["Null characters are not allowed."])
    );
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let app = offline_app();
    let payload = format!("{{\"name\": \"{}\"}}", "x".repeat(BODY_LIMIT));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/donut")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send_request(&app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
