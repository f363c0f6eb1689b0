//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use booking_store::InMemoryBookingStore;
use domain::{InMemoryUserDirectory, UserProfile};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::RecordingNotifier;
use serde_json::{Value, json};
use tower::ServiceExt;

use api::config::Config;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

const ADMIN: (&str, &str) = ("organizer", "admin");
const ALICE: (&str, &str) = ("alice", "user");
const BOB: (&str, &str) = ("bob", "user");

fn setup_with_notifier() -> (axum::Router, RecordingNotifier) {
    let directory: InMemoryUserDirectory = [
        UserProfile::new("alice", "alice@example.com", "Alice").with_business_name("Alice Books"),
        UserProfile::new("bob", "bob@example.com", "Bob"),
    ]
    .into_iter()
    .collect();
    let notifier = RecordingNotifier::new();
    let config = Config {
        notify_backoff_ms: 1,
        ..Config::default()
    };

    let (state, _worker) = api::create_default_state(
        InMemoryBookingStore::new(),
        Arc::new(directory),
        Arc::new(notifier.clone()),
        &config,
    );
    (api::create_app(state, get_metrics_handle()), notifier)
}

fn setup() -> axum::Router {
    setup_with_notifier().0
}

fn request(
    method: &str,
    uri: &str,
    caller: Option<(&str, &str)>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = caller {
        builder = builder
            .header("x-user-id", user_id)
            .header("x-user-role", role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_stall(app: &axum::Router, code: &str, size: &str, price: i64) -> String {
    let (status, json) = send(
        app,
        request(
            "POST",
            "/stalls",
            Some(ADMIN),
            Some(json!({
                "code": code,
                "size": size,
                "price": price,
                "location": "Main Hall",
                "dimensions": "3x3 meters"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_str().unwrap().to_string()
}

async fn reserve(
    app: &axum::Router,
    caller: (&str, &str),
    stall_id: &str,
    amount: i64,
) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            "/reservations",
            Some(caller),
            Some(json!({ "stallId": stall_id, "totalAmount": amount })),
        ),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    let response = app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = setup();
    let (status, json) = send(
        &app,
        request(
            "POST",
            "/reservations",
            None,
            Some(json!({ "stallId": uuid_like(), "totalAmount": 0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["kind"], "unauthorized");
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let app = setup();
    let (status, _) = send(
        &app,
        request("GET", "/reservations/mine", Some(("alice", "superuser")), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn uuid_like() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::test]
async fn test_book_conflict_cancel_rebook() {
    let app = setup();
    let stall_id = create_stall(&app, "A1", "LARGE", 15_000).await;

    let (status, first) = reserve(&app, ALICE, &stall_id, 15_000).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["status"], "CONFIRMED");
    assert_eq!(first["totalAmount"], 15_000);
    assert_eq!(first["stall"]["status"], "RESERVED");
    assert_eq!(first["user"]["email"], "alice@example.com");
    assert_eq!(first["user"]["businessName"], "Alice Books");

    let (status, json) = reserve(&app, BOB, &stall_id, 15_000).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "conflict");

    let reservation_id = first["id"].as_str().unwrap();
    let (status, cancelled) = send(
        &app,
        request(
            "PUT",
            &format!("/reservations/{reservation_id}/cancel"),
            Some(ALICE),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["stall"]["status"], "AVAILABLE");

    let (status, available) = send(&app, request("GET", "/stalls/available", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available.as_array().unwrap().len(), 1);

    let (status, second) = reserve(&app, BOB, &stall_id, 15_000).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["userId"], "bob");

    let (status, json) = send(
        &app,
        request(
            "PUT",
            &format!("/reservations/{reservation_id}/cancel"),
            Some(ALICE),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "conflict");
}

#[tokio::test]
async fn test_quota_is_enforced() {
    let app = setup();
    let mut stalls = Vec::new();
    for code in ["Q1", "Q2", "Q3", "Q4"] {
        stalls.push(create_stall(&app, code, "SMALL", 1_000).await);
    }

    for stall_id in &stalls[..3] {
        let (status, _) = reserve(&app, ALICE, stall_id, 1_000).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, json) = reserve(&app, ALICE, &stalls[3], 1_000).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "quota_exceeded");

    let (status, mine) = send(&app, request("GET", "/reservations/mine", Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_reservation_access_rules() {
    let app = setup();
    let stall_id = create_stall(&app, "A1", "MEDIUM", 2_000).await;
    let (_, booked) = reserve(&app, ALICE, &stall_id, 2_000).await;
    let uri = format!("/reservations/{}", booked["id"].as_str().unwrap());

    let (status, json) = send(&app, request("GET", &uri, Some(BOB), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "forbidden");

    let (status, json) = send(&app, request("GET", &uri, Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stall"]["code"], "A1");

    let (status, _) = send(&app, request("GET", "/reservations", Some(BOB), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, all) = send(&app, request("GET", "/reservations", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &app,
        request("GET", "/reservations/not-a-uuid", Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        request("GET", &format!("/reservations/{}", uuid_like()), Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");
}

#[tokio::test]
async fn test_statistics_are_admin_only() {
    let app = setup();
    let a = create_stall(&app, "A1", "SMALL", 10_000).await;
    let b = create_stall(&app, "A2", "LARGE", 20_000).await;
    reserve(&app, ALICE, &a, 10_000).await;
    reserve(&app, BOB, &b, 20_000).await;

    let (status, _) = send(
        &app,
        request("GET", "/reservations/statistics", Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = send(
        &app,
        request("GET", "/reservations/statistics", Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["byStatus"]["confirmed"], 2);
    assert_eq!(stats["totalRevenue"], 30_000);

    let (status, stall_stats) =
        send(&app, request("GET", "/stalls/statistics", Some(ADMIN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stall_stats["total"], 2);
    assert_eq!(stall_stats["byStatus"]["reserved"], 2);
    assert_eq!(stall_stats["bySize"]["large"], 1);
}

#[tokio::test]
async fn test_stall_administration() {
    let app = setup();

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/stalls",
            Some(ALICE),
            Some(json!({
                "code": "X1", "size": "SMALL", "price": 100,
                "location": "Hall", "dimensions": "2x2"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/stalls",
            Some(ADMIN),
            Some(json!({
                "code": "X1", "size": "SMALL", "price": -1,
                "location": "Hall", "dimensions": "2x2"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");

    let small = create_stall(&app, "S1", "SMALL", 1_000).await;
    let large = create_stall(&app, "L1", "LARGE", 9_000).await;

    let (status, listed) = send(&app, request("GET", "/stalls?size=large", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["code"], "L1");

    let (status, _) = send(&app, request("GET", "/stalls?size=huge", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = send(
        &app,
        request(
            "PUT",
            &format!("/stalls/{small}"),
            Some(ADMIN),
            Some(json!({ "maintenance": true, "location": "Annex" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "MAINTENANCE");
    assert_eq!(updated["location"], "Annex");

    let (status, _) = reserve(&app, ALICE, &small, 1_000).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = reserve(&app, ALICE, &large, 9_000).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, detail) = send(&app, request("GET", &format!("/stalls/{large}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["activeReservation"]["userId"], "alice");

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/stalls/{large}"), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/stalls/{small}"), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("GET", &format!("/stalls/{small}"), None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_confirmation() {
    let (app, notifier) = setup_with_notifier();
    let stall_id = create_stall(&app, "A1", "LARGE", 15_000).await;
    let (_, booked) = reserve(&app, ALICE, &stall_id, 15_000).await;
    let uri = format!(
        "/reservations/{}/send-confirmation",
        booked["id"].as_str().unwrap()
    );

    let (status, json) = send(&app, request("POST", &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Confirmation sent to alice@example.com");

    let (status, _) = send(&app, request("POST", &uri, Some(BOB), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    notifier.set_fail_on_send(true);
    let (status, json) = send(&app, request("POST", &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["kind"], "notification_failure");
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = setup();
    let stall_id = create_stall(&app, "A1", "SMALL", 5_000).await;

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/reservations",
            Some(ALICE),
            Some(json!({ "stallId": stall_id, "totalAmount": "lots" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");
    assert!(json["error"].is_string());

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/reservations",
            Some(ALICE),
            Some(json!({ "totalAmount": 5 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/stalls",
            Some(ADMIN),
            Some(json!({ "code": "B1", "size": "HUGE" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");

    // Nothing was booked along the way
    let (_, stall) = send(&app, request("GET", &format!("/stalls/{stall_id}"), None, None)).await;
    assert_eq!(stall["status"], "AVAILABLE");
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected() {
    let app = setup();
    let a1 = create_stall(&app, "A1", "SMALL", 5_000).await;
    let a2 = create_stall(&app, "A2", "SMALL", 5_000).await;

    for stall_id in [&a1, &a2] {
        let (status, json) = reserve(&app, ALICE, stall_id, i64::MAX / 2 + 1).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["kind"], "validation");
    }

    let (status, json) = send(
        &app,
        request("GET", "/reservations/statistics", Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
    assert_eq!(json["totalRevenue"], 0);
}

#[tokio::test]
async fn test_genre_catalog() {
    let app = setup();

    let (status, fiction) = send(
        &app,
        request(
            "POST",
            "/genres",
            Some(ADMIN),
            Some(json!({ "name": "Fiction", "description": "Fictional stories and novels" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let fiction_id = fiction["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request("POST", "/genres", Some(ALICE), Some(json!({ "name": "Comics" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(
        &app,
        request("POST", "/genres", Some(ADMIN), Some(json!({ "name": "Fiction" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "conflict");

    send(
        &app,
        request("POST", "/genres", Some(ADMIN), Some(json!({ "name": "Children" }))),
    )
    .await;

    // Reads are public
    let (status, list) = send(&app, request("GET", "/genres", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 2);
    assert_eq!(list["genres"][0]["name"], "Children");

    let (status, updated) = send(
        &app,
        request(
            "PUT",
            &format!("/genres/{fiction_id}"),
            Some(ADMIN),
            Some(json!({ "name": "Literary Fiction" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Literary Fiction");
    assert_eq!(updated["description"], "Fictional stories and novels");

    let (status, json) = send(
        &app,
        request("DELETE", &format!("/genres/{fiction_id}"), Some(ADMIN), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Genre deleted successfully");

    let (status, _) = send(&app, request("GET", &format!("/genres/{fiction_id}"), None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("GET", "/genres/not-a-uuid", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_seeded_directory_addresses_confirmations() {
    let path = std::env::temp_dir().join(format!("bookfair-users-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        json!([
            { "id": "alice", "email": "alice@example.com", "name": "Alice", "businessName": "Alice Books" }
        ])
        .to_string(),
    )
    .unwrap();
    let config = Config {
        user_directory_path: Some(path.clone()),
        notify_backoff_ms: 1,
        ..Config::default()
    };

    let directory = api::directory::directory_from_config(&config, None)
        .await
        .unwrap();
    let notifier = RecordingNotifier::new();
    let (state, _worker) = api::create_default_state(
        InMemoryBookingStore::new(),
        directory,
        Arc::new(notifier.clone()),
        &config,
    );
    let app = api::create_app(state, get_metrics_handle());
    std::fs::remove_file(path).unwrap();

    let stall_id = create_stall(&app, "A1", "LARGE", 15_000).await;
    let (status, booked) = reserve(&app, ALICE, &stall_id, 15_000).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["user"]["email"], "alice@example.com");
    assert_eq!(booked["user"]["businessName"], "Alice Books");

    // The background confirmation reaches the seeded address
    for _ in 0..100 {
        if notifier.sent_count() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(notifier.sent_count(), 1);
    assert_eq!(notifier.sent()[0].recipient_email, "alice@example.com");

    let uri = format!(
        "/reservations/{}/send-confirmation",
        booked["id"].as_str().unwrap()
    );
    let (status, json) = send(&app, request("POST", &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Confirmation sent to alice@example.com");
}

#[tokio::test]
async fn test_queued_confirmations_drain_on_shutdown() {
    let directory: InMemoryUserDirectory =
        [UserProfile::new("alice", "alice@example.com", "Alice")]
            .into_iter()
            .collect();
    let notifier = RecordingNotifier::new();
    let (state, worker) = api::create_default_state(
        InMemoryBookingStore::new(),
        Arc::new(directory),
        Arc::new(notifier.clone()),
        &Config::default(),
    );
    let app = api::create_app(state, get_metrics_handle());

    let a1 = create_stall(&app, "A1", "SMALL", 5_000).await;
    let a2 = create_stall(&app, "A2", "SMALL", 5_000).await;
    reserve(&app, ALICE, &a1, 5_000).await;
    reserve(&app, ALICE, &a2, 5_000).await;

    drop(app);
    tokio::time::timeout(std::time::Duration::from_secs(5), worker)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notifier.sent_count(), 2);
}
