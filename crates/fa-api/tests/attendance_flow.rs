use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header::CONTENT_TYPE},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

async fn enroll(app: &Router, body: Value) -> Value {
    let (status, _, body) = post(app, "/api/identities", body).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

fn marked(body: &Value) -> Vec<(String, String)> {
    body["recognized"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            (
                entry["display_name"].as_str().unwrap().to_string(),
                entry["direction"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

fn app_with_staff() -> (fa_api::SharedState, Router) {
    let state = fa_api::test_state_with_dimension(3);
    let app = fa_api::create_router(state.clone());
    (state, app)
}

#[tokio::test]
async fn enroll_then_toggle_attendance_across_endpoints() {
    let (state, app) = app_with_staff();

    let alice = enroll(
        &app,
        json!({"first_name": "Alice", "last_name": "Ng", "phone": "555-0101",
               "organization": "acme", "faces": [[2.0, 0.0, 0.0]]}),
    )
    .await;
    let bob = enroll(
        &app,
        json!({"name": "Bob", "organization": "Globex", "faces": [[0.0, 3.0, 0.0]]}),
    )
    .await;

    assert_eq!(alice["display_name"], "Alice Ng");
    assert_eq!(alice["is_vendor"], false);
    assert_eq!(alice["searchable"], true);
    assert_eq!(bob["is_vendor"], true);
    assert_eq!(state.store.len(), 2);

    let (status, headers, body) = post(
        &app,
        "/api/attendance/mark",
        json!({"faces": [[0.9, 0.1, 0.0], [0.0, 0.0, 1.0]]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Attendance marked for: Alice Ng (Check-In)");
    assert_eq!(body["request_id"], headers["x-request-id"].to_str().unwrap());

    let (status, _, body) = post(
        &app,
        "/api/attendance/mark-face",
        json!({"faces": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked(&body), vec![("Alice Ng".into(), "check_out".into())]);

    let (status, _, body) = post(
        &app,
        "/api/attendance/wave-mark",
        json!({"faces": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        marked(&body),
        vec![
            ("Alice Ng".into(), "check_in".into()),
            ("Bob".into(), "check_in".into()),
        ]
    );
}

#[tokio::test]
async fn negative_outcomes_map_to_statuses() {
    let (_, app) = app_with_staff();
    enroll(&app, json!({"first_name": "Alice", "faces": [[1.0, 0.0, 0.0]]})).await;

    let (status, _, body) = post(&app, "/api/attendance/mark", json!({"faces": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "no_faces_detected");
    assert_eq!(body["success"], false);

    let (status, _, body) = post(
        &app,
        "/api/attendance/mark",
        json!({"faces": [[0.0, 0.0, 1.0]]}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_recognized");
    assert_eq!(body["message"], "Face not recognized");

    let (status, _, body) = post(
        &app,
        "/api/attendance/mark",
        json!({"faces": [[1.0, 0.0]]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn enrollment_rules() {
    let (state, app) = app_with_staff();

    let (status, _, body) = post(&app, "/api/identities", json!({"first_name": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    enroll(&app, json!({"first_name": "Asha", "phone": "555-0100"})).await;
    let (status, _, body) = post(
        &app,
        "/api/identities",
        json!({"first_name": "Other", "phone": "555-0100"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let degenerate = enroll(
        &app,
        json!({"first_name": "Zero", "faces": [[0.0, 0.0, 0.0]]}),
    )
    .await;
    assert_eq!(degenerate["searchable"], false);

    let (status, _, _) = post(
        &app,
        "/api/identities",
        json!({"first_name": "Short", "faces": [[1.0, 0.0]]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(state.store.is_empty());
}

#[tokio::test]
async fn rejected_enrollment_does_not_create_its_organization() {
    use fa_common::OrganizationRegistry;

    let (state, app) = app_with_staff();
    enroll(
        &app,
        json!({"first_name": "Asha", "phone": "555-0100", "organization": "Acme"}),
    )
    .await;

    let (status, _, _) = post(
        &app,
        "/api/identities",
        json!({"first_name": "Other", "phone": "555-0100", "organization": "Globex"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let names: Vec<String> = state
        .backend
        .list_organizations()
        .await
        .unwrap()
        .into_iter()
        .map(|org| org.name)
        .collect();
    assert_eq!(names, vec!["Acme".to_string()]);
}
