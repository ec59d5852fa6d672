use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use jiwani_api::mailer::LogMailer;
use jiwani_api::middleware::issue_token;
use jiwani_api::state::{AppState, AuthConfig, Backends, UploadSettings};
use jiwani_api::app;
use jiwani_core::member::TokenPurpose;
use jiwani_core::payment::notification_signature;
use jiwani_core::repository::MemberRepository;
use jiwani_order::MockPaymentGateway;
use jiwani_store::memory::{FailPoint, MemoryStore, ES_TEH, NASI_GORENG};

const SERVER_KEY: &str = "test-server-key";

struct TestApp {
    router: Router,
    store: MemoryStore,
    mailer: Arc<LogMailer>,
    auth: AuthConfig,
    uploads: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_store(MemoryStore::seeded(), 4)
    }

    fn with_store(store: MemoryStore, bcrypt_cost: u32) -> Self {
        let mailer = Arc::new(LogMailer::new());
        let uploads = TempDir::new().unwrap();
        let auth = AuthConfig { secret: "test-secret".to_string(), expiration: 3600, bcrypt_cost };

        let backends = Backends {
            menu_repo: Arc::new(store.clone()),
            member_repo: Arc::new(store.clone()),
            order_repo: Arc::new(store.clone()),
            top_up_repo: Arc::new(store.clone()),
            uow: Arc::new(store.clone()),
        };
        let state = AppState::new(
            backends,
            Arc::new(MockPaymentGateway::new(SERVER_KEY)),
            mailer.clone(),
            auth.clone(),
            UploadSettings { dir: uploads.path().to_path_buf(), max_bytes: 1024 },
            "http://localhost:8080".to_string(),
        );

        Self { router: app(state), store, mailer, auth, uploads }
    }

    async fn token_for(&self, member_id: i64) -> String {
        let member = self.store.get_member(member_id).await.unwrap().unwrap();
        issue_token(&self.auth, &member).unwrap()
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

fn signed_notification(order_id: &str, status: &str, gross_amount: &str, key: &str) -> Value {
    json!({
        "order_id": order_id,
        "transaction_status": status,
        "fraud_status": "accept",
        "gross_amount": gross_amount,
        "status_code": "200",
        "signature_key": notification_signature(order_id, "200", gross_amount, key),
        "transaction_id": "trx-1",
    })
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn test_registration_verification_and_login() {
    let app = TestApp::new();
    let registration = json!({
        "name": "Putu Ayu",
        "username": "putu.ayu",
        "email": "Putu@Example.com",
        "password": "rahasia123",
    });

    let (status, member) = app.send(Method::POST, "/api/auth/register", None, Some(registration.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["email"], "putu@example.com");
    assert!(member.get("password_hash").is_none());
    let member_id = member["id"].as_i64().unwrap();

    let stored = app.store.get_member(member_id).await.unwrap().unwrap();
    assert_ne!(stored.password_hash, "rahasia123");
    assert_eq!(app.mailer.sent().len(), 1);

    let (status, _) = app.send(Method::POST, "/api/auth/register", None, Some(registration)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let login = json!({ "identifier": "putu.ayu", "password": "rahasia123" });
    let (status, _) = app.send(Method::POST, "/api/auth/login", None, Some(login.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = app.store.latest_token(member_id, TokenPurpose::VerifyEmail).await.unwrap();
    let (status, _) = app.send(Method::GET, &format!("/api/auth/verify?token={}", token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::GET, &format!("/api/auth/verify?token={}", token), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send(Method::POST, "/api/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().unwrap().len() > 20);

    let wrong = json!({ "identifier": "putu@example.com", "password": "salah12345" });
    let (status, body) = app.send(Method::POST, "/api/auth/login", None, Some(wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid credentials");
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new();
    let registration = json!({ "name": "Made", "username": "made", "email": "made@example.com", "password": "lama12345" });
    let (_, member) = app.send(Method::POST, "/api/auth/register", None, Some(registration)).await;
    let member_id = member["id"].as_i64().unwrap();
    app.store.set_email_verified(member_id).await.unwrap();

    let (status, _) = app.send(Method::POST, "/api/auth/password-reset", None, Some(json!({ "email": "nobody@example.com" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = app.send(Method::POST, "/api/auth/password-reset", None, Some(json!({ "email": "made@example.com" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let token = app.store.latest_token(member_id, TokenPurpose::ResetPassword).await.unwrap();
    let confirm = json!({ "token": token, "password": "baru123456" });
    let (status, _) = app.send(Method::POST, "/api/auth/password-reset/confirm", None, Some(confirm.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::POST, "/api/auth/password-reset/confirm", None, Some(confirm)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let login = json!({ "identifier": "made", "password": "baru123456" });
    let (status, _) = app.send(Method::POST, "/api/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_failed_password_reset_keeps_token_usable() {
    let store = MemoryStore::seeded();
    let app = TestApp::with_store(store.clone(), 4);
    // bcrypt rejects costs above 31, so every hash attempt here fails
    let broken = TestApp::with_store(store.clone(), 40);
    let member = store.add_member("Ketut", 0).await;
    let email = store.get_member(member).await.unwrap().unwrap().email;

    let (status, _) = app.send(Method::POST, "/api/auth/password-reset", None, Some(json!({ "email": email }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let token = store.latest_token(member, TokenPurpose::ResetPassword).await.unwrap();
    let confirm = json!({ "token": token, "password": "baru123456" });

    let (status, _) = broken.send(Method::POST, "/api/auth/password-reset/confirm", None, Some(confirm.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = app.send(Method::POST, "/api/auth/password-reset/confirm", None, Some(confirm)).await;
    assert_eq!(status, StatusCode::OK);

    let login = json!({ "identifier": email, "password": "baru123456" });
    let (status, _) = app.send(Method::POST, "/api/auth/login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_route_guards() {
    let app = TestApp::new();
    let siti = app.store.add_member("Siti", 0).await;
    let budi = app.store.add_member("Budi", 0).await;
    let siti_token = app.token_for(siti).await;

    let (status, _) = app.send(Method::GET, "/api/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/api/orders", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let item = json!({ "name": "Soto", "price": 18000, "category_id": 1 });
    let (status, _) = app.send(Method::POST, "/api/menu", Some(&siti_token), Some(item)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, &format!("/api/members/{}/balance", budi), Some(&siti_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(Method::GET, "/api/menu?active=true", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_menu_management() {
    let app = TestApp::new();
    let admin = app.store.add_admin("Pak Admin").await;
    let token = app.token_for(admin).await;

    let (status, created) = app
        .send(Method::POST, "/api/menu", Some(&token), Some(json!({ "name": " Soto Ayam ", "price": 18000, "category_id": 1 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Soto Ayam");
    assert_eq!(created["category"], "Makanan");
    let id = created["id"].as_i64().unwrap();

    let (status, updated) = app
        .send(Method::PATCH, &format!("/api/menu/{}/price", id), Some(&token), Some(json!({ "price": 20000 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 20000);

    let (status, _) = app
        .send(Method::PATCH, &format!("/api/menu/{}/price", id), Some(&token), Some(json!({ "price": -1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app
        .send(Method::PATCH, &format!("/api/menu/{}/active", id), Some(&token), Some(json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_active"], false);

    let (status, _) = app
        .send(Method::POST, "/api/menu", Some(&token), Some(json!({ "name": "Bakso", "price": 15000, "category_id": 99 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::DELETE, &format!("/api/menu/{}", id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::GET, &format!("/api/menu/{}", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_balance_order_cancel_refunds_once() {
    let app = TestApp::new();
    let member = app.store.add_member("Siti", 100_000).await;
    let token = app.token_for(member).await;

    let order = json!({
        "table_id": 2,
        "payment_method": "balance",
        "items": [
            { "item_id": NASI_GORENG, "quantity": 1 },
            { "item_id": ES_TEH, "quantity": 3, "line_total": 15000 },
        ],
    });
    let (status, placed) = app.send(Method::POST, "/api/orders", Some(&token), Some(order)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placed["total"], 40_000);
    assert_eq!(placed["payment_status"], "paid");
    let order_id = placed["order_id"].as_i64().unwrap();
    assert_eq!(app.store.balance_of(member).await, 60_000);

    let (status, outcome) = app.send(Method::POST, &format!("/api/orders/{}/cancel", order_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["refunded"], 40_000);

    let (status, _) = app.send(Method::POST, &format!("/api/orders/{}/cancel", order_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, balance) = app.send(Method::GET, &format!("/api/members/{}/balance", member), Some(&token), None).await;
    assert_eq!(balance["balance"], 100_000);

    let (_, history) = app.send(Method::GET, &format!("/api/members/{}/topups", member), Some(&token), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["source"], "refund");

    assert_eq!(app.store.order_changes(order_id).await, vec!["ORDER_PLACED", "ORDER_CANCELLED"]);
}

#[tokio::test]
async fn test_audit_write_failure_does_not_fail_placement() {
    let app = TestApp::new();
    let member = app.store.add_member("Siti", 0).await;
    let token = app.token_for(member).await;

    app.store.fail_at(FailPoint::AuditWrite).await;
    let order = json!({ "table_id": 1, "payment_method": "cashier", "items": [{ "item_id": ES_TEH, "quantity": 2 }] });
    let (status, placed) = app.send(Method::POST, "/api/orders", Some(&token), Some(order)).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = placed["order_id"].as_i64().unwrap();
    assert!(app.store.order_changes(order_id).await.is_empty());

    let (status, _) = app.send(Method::POST, &format!("/api/orders/{}/cancel", order_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.order_changes(order_id).await, vec!["ORDER_CANCELLED"]);
}

#[tokio::test]
async fn test_tampered_total_and_foreign_order_rejected() {
    let app = TestApp::new();
    let siti = app.store.add_member("Siti", 0).await;
    let budi = app.store.add_member("Budi", 0).await;
    let siti_token = app.token_for(siti).await;
    let budi_token = app.token_for(budi).await;

    let tampered = json!({
        "table_id": 1,
        "payment_method": "cashier",
        "items": [{ "item_id": NASI_GORENG, "quantity": 2, "line_total": 100 }],
    });
    let (status, _) = app.send(Method::POST, "/api/orders", Some(&siti_token), Some(tampered)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.order_count().await, 0);

    let honest = json!({ "table_id": 1, "payment_method": "cashier", "items": [{ "item_id": ES_TEH, "quantity": 1 }] });
    let (_, placed) = app.send(Method::POST, "/api/orders", Some(&siti_token), Some(honest)).await;
    let order_id = placed["order_id"].as_i64().unwrap();

    let (status, _) = app.send(Method::GET, &format!("/api/orders/{}", order_id), Some(&budi_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.send(Method::POST, &format!("/api/orders/{}/cancel", order_id), Some(&budi_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let on_behalf = json!({ "member_id": siti, "table_id": 1, "payment_method": "cashier", "items": [{ "item_id": ES_TEH, "quantity": 1 }] });
    let (status, _) = app.send(Method::POST, "/api/orders", Some(&budi_token), Some(on_behalf)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_status_filter_partitions_orders() {
    let app = TestApp::new();
    let member = app.store.add_member("Siti", 0).await;
    let admin = app.store.add_admin("Pak Admin").await;
    let token = app.token_for(member).await;
    let admin_token = app.token_for(admin).await;

    let mut ids = Vec::new();
    for _ in 0..4 {
        let order = json!({ "table_id": 3, "payment_method": "cashier", "items": [{ "item_id": ES_TEH, "quantity": 1 }] });
        let (_, placed) = app.send(Method::POST, "/api/orders", Some(&token), Some(order)).await;
        ids.push(placed["order_id"].as_i64().unwrap());
    }

    let (status, completed) = app
        .send(Method::PATCH, &format!("/api/orders/{}/status", ids[0]), Some(&admin_token), Some(json!({ "status": "completed" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");
    let (status, _) = app
        .send(Method::PATCH, &format!("/api/orders/{}/status", ids[1]), Some(&admin_token), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::POST, &format!("/api/orders/{}/cancel", ids[0]), Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut seen = Vec::new();
    for (status_name, expected) in [("pending", 2), ("completed", 1), ("cancelled", 1)] {
        let (_, orders) = app.send(Method::GET, &format!("/api/orders?status={}", status_name), Some(&admin_token), None).await;
        let orders = orders.as_array().unwrap();
        assert_eq!(orders.len(), expected, "{}", status_name);
        seen.extend(orders.iter().map(|o| o["id"].as_i64().unwrap()));
    }
    seen.sort();
    assert_eq!(seen, ids);
}

#[tokio::test]
async fn test_cashier_payment_is_recorded_once() {
    let app = TestApp::new();
    let member = app.store.add_member("Siti", 0).await;
    let admin = app.store.add_admin("Pak Admin").await;
    let token = app.token_for(member).await;
    let admin_token = app.token_for(admin).await;

    let order = json!({ "table_id": 1, "payment_method": "cashier", "items": [{ "item_id": NASI_GORENG, "quantity": 1 }] });
    let (_, placed) = app.send(Method::POST, "/api/orders", Some(&token), Some(order)).await;
    assert_eq!(placed["payment_status"], "unpaid");
    let order_id = placed["order_id"].as_i64().unwrap();

    let (status, view) = app.send(Method::POST, &format!("/api/orders/{}/paid", order_id), Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["payment_status"], "paid");

    let (status, _) = app.send(Method::POST, &format!("/api/orders/{}/paid", order_id), Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app.send(Method::POST, "/api/orders/999/paid", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_top_up_settles_once() {
    let app = TestApp::new();
    let member = app.store.add_member("Rina", 1_000).await;
    let token = app.token_for(member).await;

    let (status, checkout) = app
        .send(Method::POST, &format!("/api/members/{}/topups/checkout", member), Some(&token), Some(json!({ "amount": 50000 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let gateway_order_id = checkout["gateway_order_id"].as_str().unwrap().to_string();

    let forged = signed_notification(&gateway_order_id, "settlement", "50000.00", "wrong-key");
    let (status, _) = app.send(Method::POST, "/api/webhooks/payments/midtrans", None, Some(forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.balance_of(member).await, 1_000);

    let genuine = signed_notification(&gateway_order_id, "settlement", "50000.00", SERVER_KEY);
    let (status, outcome) = app.send(Method::POST, "/api/webhooks/payments/midtrans", None, Some(genuine.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "credited");
    assert_eq!(app.store.balance_of(member).await, 51_000);

    let (status, replay) = app.send(Method::POST, "/api/webhooks/payments/midtrans", None, Some(genuine)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["outcome"], "duplicate");
    assert_eq!(app.store.balance_of(member).await, 51_000);
}

#[tokio::test]
async fn test_admin_ledger_and_top_up_listing() {
    let app = TestApp::new();
    let member = app.store.add_member("Wayan", 0).await;
    let admin = app.store.add_admin("Pak Admin").await;
    let admin_token = app.token_for(admin).await;

    let (status, receipt) = app
        .send(Method::POST, &format!("/api/members/{}/balance/credit", member), Some(&admin_token), Some(json!({ "amount": 30000 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["new_balance"], 30_000);

    let (status, _) = app
        .send(Method::POST, &format!("/api/members/{}/balance/debit", member), Some(&admin_token), Some(json!({ "amount": 50000 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, receipt) = app
        .send(Method::POST, &format!("/api/members/{}/balance/debit", member), Some(&admin_token), Some(json!({ "amount": 10000 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["new_balance"], 20_000);

    let (status, all) = app.send(Method::GET, "/api/topups", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["source"], "admin");
}

#[tokio::test]
async fn test_completed_orders_export() {
    let app = TestApp::new();
    let admin = app.store.add_admin("Pak Admin").await;
    let admin_token = app.token_for(admin).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/orders/export/completed")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin_token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn test_menu_image_upload() {
    let app = TestApp::new();
    let admin = app.store.add_admin("Pak Admin").await;
    let admin_token = app.token_for(admin).await;

    let upload = |file_name: &str, content: &[u8]| {
        let boundary = "jiwani-boundary";
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = boundary,
            f = file_name
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/uploads/menu-images")
            .header(header::AUTHORIZATION, format!("Bearer {}", admin_token))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(body))
            .unwrap()
    };

    let response = app.router.clone().oneshot(upload("nasi.PNG", b"\x89PNG fake")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let stored: Value = serde_json::from_slice(&bytes).unwrap();
    let name = stored["image"].as_str().unwrap();
    assert!(name.ends_with(".png"));
    assert!(app.uploads.path().join(name).exists());

    let response = app.router.clone().oneshot(upload("anim.gif", b"GIF89a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.router.clone().oneshot(upload("huge.jpg", &[0u8; 2048])).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
