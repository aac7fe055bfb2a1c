//! HTTP surface tests.
//!
//! Uses `tower::ServiceExt` to drive the router without a real server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use notification_pipeline::compose::NotificationComposer;
use notification_pipeline::config::Settings;
use notification_pipeline::server::{create_app, AppState};
use notification_pipeline::store::{MemoryNotificationStore, NotificationStore};
use notification_pipeline::worker::{MemoryWorkQueue, WorkQueue};

const API_KEY: &str = "intake-secret";

struct TestApp {
    router: Router,
    store: Arc<MemoryNotificationStore>,
    queue: Arc<MemoryWorkQueue>,
}

fn test_app(api_key: Option<&str>) -> TestApp {
    let mut settings = Settings::default();
    settings.api.key = api_key.map(String::from);

    let store = Arc::new(MemoryNotificationStore::new());
    let queue = Arc::new(MemoryWorkQueue::new(100, Duration::from_millis(10)));
    let composer = Arc::new(NotificationComposer::new(store.clone(), 3).with_queue(queue.clone()));
    let state = AppState::new(settings, composer, queue.clone(), None);

    TestApp {
        router: create_app(state),
        store,
        queue,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
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

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn order_json(status: &str) -> Value {
    json!({
        "id": "order-1",
        "order_number": "ORD-123",
        "status": status,
        "total_amount": "150.00",
        "buyer_id": "buyer-1",
        "buyer_email": "buyer@example.com",
        "merchant_name": "Corner Shop",
        "merchant_owner_id": "owner-1"
    })
}

#[tokio::test]
async fn health_reports_backends() {
    let app = test_app(None);
    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["backend"], "memory");
    assert_eq!(body["queue"]["backend"], "memory");
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let app = test_app(None);
    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("notifier_queue_depth"));
}

#[tokio::test]
async fn intake_requires_api_key_when_configured() {
    let app = test_app(Some(API_KEY));

    let (status, body) = send(
        &app.router,
        post_json("/api/v1/events/orders/created", order_json("NEW"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app.router,
        post_json("/api/v1/events/orders/created", order_json("NEW"), Some("wrong")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app.router,
        post_json("/api/v1/events/orders/created", order_json("NEW"), Some(API_KEY)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["notification_ids"].as_array().unwrap().len(), 2);

    // Inbox routes are not behind the intake key
    let (status, _) = send(&app.router, get("/api/v1/users/buyer-1/notifications")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn order_event_enqueues_deliveries() {
    let app = test_app(None);
    send(
        &app.router,
        post_json("/api/v1/events/orders/created", order_json("NEW"), None),
    )
    .await;

    // Buyer: email + in-app; owner: email (no address) + in-app
    assert_eq!(app.queue.len().await.unwrap(), 4);
}

#[tokio::test]
async fn status_change_without_previous_composes_nothing() {
    let app = test_app(None);
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events/orders/status-changed",
            json!({ "current": order_json("CONFIRMED") }),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["notification_ids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn inbox_read_flow() {
    let app = test_app(None);
    for _ in 0..3 {
        send(
            &app.router,
            post_json(
                "/api/v1/notifications",
                json!({
                    "user_id": "user-1",
                    "notification_type": "LISTING_APPROVED",
                    "title": "Listing Approved",
                    "body": "Your listing is live.",
                    "deferred": true
                }),
                None,
            ),
        )
        .await;
    }
    assert_eq!(app.queue.len().await.unwrap(), 0);

    let (_, page) = send(
        &app.router,
        get("/api/v1/users/user-1/notifications?page=1&page_size=2"),
    )
    .await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);

    let id = page["items"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/users/user-1/notifications/{}/read", id);
    let (status, first) = send(&app.router, post_json(&uri, json!({}), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(&app.router, post_json(&uri, json!({}), None)).await;
    assert_eq!(first["read_at"], second["read_at"]);

    let (_, count) = send(
        &app.router,
        get("/api/v1/users/user-1/notifications/unread-count"),
    )
    .await;
    assert_eq!(count["unread_count"], 2);

    let (_, unread) = send(
        &app.router,
        get("/api/v1/users/user-1/notifications?unread_only=true"),
    )
    .await;
    assert_eq!(unread["total"], 2);

    let (_, all) = send(
        &app.router,
        post_json("/api/v1/users/user-1/notifications/read-all", json!({}), None),
    )
    .await;
    assert_eq!(all["updated"], 2);
    assert_eq!(app.store.unread_count("user-1").await.unwrap(), 0);
}

#[tokio::test]
async fn mark_read_of_unknown_notification_is_404() {
    let app = test_app(None);
    let uri = format!(
        "/api/v1/users/user-1/notifications/{}/read",
        uuid::Uuid::new_v4()
    );
    let (status, body) = send(&app.router, post_json(&uri, json!({}), None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn compose_rejects_empty_user() {
    let app = test_app(None);
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/notifications",
            json!({
                "user_id": " ",
                "notification_type": "ORDER_CREATED",
                "title": "t",
                "body": "b"
            }),
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn preferences_and_devices() {
    let app = test_app(None);

    let (status, pref) = send(&app.router, get("/api/v1/users/user-2/preferences")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pref["push_enabled"], true);

    let request = Request::builder()
        .method("PUT")
        .uri("/api/v1/users/user-2/preferences")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "push_enabled": false }).to_string()))
        .unwrap();
    let (_, pref) = send(&app.router, request).await;
    assert_eq!(pref["push_enabled"], false);
    assert_eq!(pref["email_enabled"], true);

    for _ in 0..2 {
        send(
            &app.router,
            post_json("/api/v1/users/user-2/devices", json!({ "token": "tok-1" }), None),
        )
        .await;
    }
    let stored = app.store.get_or_create_preference("user-2").await.unwrap();
    assert_eq!(stored.device_tokens, vec!["tok-1"]);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/v1/users/user-2/devices/tok-1")
        .body(Body::empty())
        .unwrap();
    let (status, pref) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(pref["device_tokens"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delivery_inspection() {
    let app = test_app(None);
    let (_, body) = send(
        &app.router,
        post_json(
            "/api/v1/notifications",
            json!({
                "user_id": "user-3",
                "email": "user3@example.com",
                "notification_type": "MERCHANT_APPROVED",
                "title": "Merchant Account Approved",
                "body": "Welcome aboard."
            }),
            None,
        ),
    )
    .await;
    let id = body["notification_ids"][0].as_str().unwrap().to_string();

    let (status, deliveries) = send(
        &app.router,
        get(&format!("/api/v1/notifications/{}/deliveries", id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deliveries.as_array().unwrap().len(), 2);

    let (status, _) = send(
        &app.router,
        get(&format!(
            "/api/v1/notifications/{}/deliveries",
            uuid::Uuid::new_v4()
        )),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, exhausted) = send(&app.router, get("/api/v1/deliveries/exhausted?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(exhausted.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn change_events_reach_their_listeners() {
    let app = test_app(None);

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events/orders/status-changed",
            json!({ "previous": order_json("NEW"), "current": order_json("CONTACTED") }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["notification_ids"].as_array().unwrap().len(), 1);

    let merchant = |status: &str, verified: bool| {
        json!({
            "id": "merchant-1",
            "name": "Corner Shop",
            "owner_id": "owner-1",
            "status": status,
            "verified": verified
        })
    };
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events/merchants/changed",
            json!({ "previous": merchant("PENDING", false), "current": merchant("ACTIVE", true) }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["notification_ids"].as_array().unwrap().len(), 1);

    let listing = |status: &str| {
        json!({
            "id": "listing-1",
            "title": "Road Bike",
            "owner_id": "seller-1",
            "status": status,
            "rejection_reason": "Blurry photos"
        })
    };
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/events/listings/changed",
            json!({ "previous": listing("PENDING"), "current": listing("REJECTED") }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["notification_ids"].as_array().unwrap().len(), 1);

    let (_, page) = send(&app.router, get("/api/v1/users/seller-1/notifications")).await;
    assert_eq!(page["items"][0]["notification_type"], "LISTING_REJECTED");
}

#[tokio::test]
async fn retried_intake_with_event_id_is_not_duplicated() {
    let app = test_app(None);
    let request = || {
        let mut request = post_json("/api/v1/events/orders/created", order_json("NEW"), None);
        request
            .headers_mut()
            .insert("X-Event-Id", "order-1-created".parse().unwrap());
        request
    };

    let (_, first) = send(&app.router, request()).await;
    let (status, retried) = send(&app.router, request()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["notification_ids"], retried["notification_ids"]);
    assert_eq!(app.store.unread_count("buyer-1").await.unwrap(), 1);
    assert_eq!(app.queue.len().await.unwrap(), 4);
}
