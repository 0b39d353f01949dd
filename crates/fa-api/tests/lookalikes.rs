use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn enroll(app: &Router, name: &str, face: [f32; 3]) -> String {
    let (status, body) = post(
        app,
        "/api/identities",
        json!({"first_name": name, "faces": [face]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["identity_key"].as_str().unwrap().to_string()
}

fn names_and_percentages(body: &Value) -> Vec<(String, f64)> {
    body["matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["display_name"].as_str().unwrap().to_string(),
                m["similarity_percentage"].as_f64().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn empty_cache_reports_no_identities() {
    let app = fa_api::create_router(fa_api::test_state_with_dimension(3));

    let (status, body) = post(&app, "/api/lookalikes", json!({"face": [1.0, 0.0, 0.0]})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_identities");
    assert!(body["matches"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn excludes_self_and_returns_next_closest() {
    let app = fa_api::create_router(fa_api::test_state_with_dimension(3));
    enroll(&app, "Self", [1.0, 0.0, 0.0]).await;
    enroll(&app, "Near", [0.8, 0.6, 0.0]).await;
    enroll(&app, "Far", [0.6, 0.8, 0.0]).await;
    enroll(&app, "Farthest", [0.0, 0.0, 1.0]).await;

    let (status, body) = post(&app, "/api/lookalikes", json!({"face": [1.0, 0.0, 0.0]})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "found");
    let ranked = names_and_percentages(&body);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].0, "Near");
    assert!((ranked[0].1 - 80.0).abs() < 0.011);
    assert_eq!(ranked[1].0, "Far");
    assert!((ranked[1].1 - 60.0).abs() < 0.011);
}

#[tokio::test]
async fn explicit_exclusion_and_k_override() {
    let app = fa_api::create_router(fa_api::test_state_with_dimension(3));
    enroll(&app, "A", [1.0, 0.0, 0.0]).await;
    let b = enroll(&app, "B", [0.8, 0.6, 0.0]).await;
    enroll(&app, "C", [0.0, 1.0, 0.0]).await;

    let (status, body) = post(
        &app,
        "/api/lookalikes",
        json!({"face": [0.8, 0.6, 0.0], "k": 1, "exclude_identity_key": b}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ranked = names_and_percentages(&body);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].0, "A");
}

#[tokio::test]
async fn only_self_in_cache_reports_no_close_match() {
    let app = fa_api::create_router(fa_api::test_state_with_dimension(3));
    enroll(&app, "Solo", [0.0, 1.0, 0.0]).await;

    let (status, body) = post(&app, "/api/lookalikes", json!({"face": [0.0, 1.0, 0.0]})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_close_match");
    assert!((body["max_similarity"].as_f64().unwrap() - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn rejects_wrong_dimension_and_zero_vectors() {
    let app = fa_api::create_router(fa_api::test_state_with_dimension(3));

    let (short, _) = post(&app, "/api/lookalikes", json!({"face": [1.0, 0.0]})).await;
    let (zero, body) = post(&app, "/api/lookalikes", json!({"face": [0.0, 0.0, 0.0]})).await;

    assert_eq!(short, StatusCode::BAD_REQUEST);
    assert_eq!(zero, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}
