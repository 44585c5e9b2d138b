//! Runs the real server on a local port with the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use storefront_core::build_server;
use storefront_core::domain::order::ShippingPolicy;
use storefront_core::domain::ports::ProductRepository;
use storefront_core::domain::product::{ApprovalStatus, NewProduct, ProductPatch};
use storefront_core::identity::{USER_ID_HEADER, USER_ROLES_HEADER};
use storefront_core::infrastructure::change_feed::ChangeFeed;
use storefront_core::infrastructure::guest_cart::FileGuestCartStore;
use storefront_core::infrastructure::memory::MemoryStore;
use storefront_core::infrastructure::notifier::LogNotifier;
use storefront_core::{AppState, Stores};

/// Wait until `url` answers at all, retrying every `interval` for up to
/// `timeout` total. Panics if the service never comes up.
async fn wait_for_http(url: &str, timeout: Duration, interval: Duration) {
    let client = Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .expect("http client");
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::time::Instant::now() > deadline {
            panic!("server did not become ready within {:?}", timeout);
        }
        if client.get(url).send().await.is_ok() {
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn start(port: u16) -> (Arc<MemoryStore>, String, tempfile::TempDir) {
    let guest_dir = tempfile::tempdir().expect("temp dir");
    let feed = ChangeFeed::default();
    let store = Arc::new(MemoryStore::new(feed.clone()));
    let stores = Stores::memory(
        store.clone(),
        Arc::new(FileGuestCartStore::new(guest_dir.path())),
        Arc::new(LogNotifier),
    );
    let state = AppState::new(stores, feed, ShippingPolicy::default()).expect("state");
    state.follow_changes();

    let server = build_server(web::Data::new(state), "127.0.0.1", port).expect("bind");
    actix_web::rt::spawn(server);

    let base = format!("http://127.0.0.1:{port}");
    wait_for_http(
        &format!("{base}/products"),
        Duration::from_secs(10),
        Duration::from_millis(100),
    )
    .await;
    (store, base, guest_dir)
}

#[actix_web::test]
async fn serves_openapi_document() {
    let (_store, base, _guest_dir) = start(18181).await;

    let doc: Value = Client::new()
        .get(format!("{base}/api-docs/openapi.json"))
        .send()
        .await
        .expect("openapi request")
        .json()
        .await
        .expect("openapi json");
    assert!(doc["paths"]["/checkout/commit"].is_object());
    assert!(doc["paths"]["/finance/pending"].is_object());
}

/// A status change made outside any request still reaches the finance board,
/// through the change feed.
#[actix_web::test]
async fn finance_board_follows_store_changes() {
    let (store, base, _guest_dir) = start(18182).await;
    let finance = Uuid::new_v4();

    let product = store
        .insert(NewProduct {
            supplier_id: Uuid::new_v4(),
            name: "Clay pot".to_string(),
            description: None,
            supplier_price: BigDecimal::from(80),
            stock_quantity: 6,
            image_url: None,
        })
        .expect("insert");
    store
        .transition(
            product.id,
            ApprovalStatus::Pending,
            ProductPatch {
                approval_status: Some(ApprovalStatus::FinancePending),
                ..Default::default()
            },
        )
        .expect("forward");

    let client = Client::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let board: Value = client
            .get(format!("{base}/finance/pending"))
            .header(USER_ID_HEADER, finance.to_string())
            .header(USER_ROLES_HEADER, "finance")
            .send()
            .await
            .expect("board request")
            .json()
            .await
            .expect("board json");
        if board[0]["id"] == json!(product.id) {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("product never reached the finance board: {board}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[actix_web::test]
async fn guest_cart_survives_in_files() {
    let (store, base, guest_dir) = start(18183).await;
    let product = store
        .insert(NewProduct {
            supplier_id: Uuid::new_v4(),
            name: "Cotton throw".to_string(),
            description: None,
            supplier_price: BigDecimal::from(60),
            stock_quantity: 3,
            image_url: None,
        })
        .expect("insert");
    store
        .transition(
            product.id,
            ApprovalStatus::Pending,
            ProductPatch {
                approval_status: Some(ApprovalStatus::Approved),
                ..Default::default()
            },
        )
        .expect("approve");

    let session = Uuid::new_v4();
    let resp = Client::new()
        .post(format!("{base}/cart/items"))
        .header("X-Guest-Session", session.to_string())
        .json(&json!({ "product_id": product.id, "quantity": 2 }))
        .send()
        .await
        .expect("add request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let saved = std::fs::read_dir(guest_dir.path())
        .expect("guest dir")
        .count();
    assert_eq!(saved, 1);
}
