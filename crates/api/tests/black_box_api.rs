use reqwest::StatusCode;
use serde_json::{Value, json};

use phonestore_infra::config::ServiceConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let (app, _services) = phonestore_api::app::build_app(&ServiceConfig::default()).unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The consumer side is asynchronous; poll until the outcome is recorded.
async fn outcome_eventually(client: &reqwest::Client, srv: &TestServer, cid: &str) -> Value {
    for _ in 0..100 {
        let res = client
            .get(srv.url(&format!("/requests/{cid}")))
            .send()
            .await
            .unwrap();

        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("no outcome recorded for {cid} within timeout");
}

async fn create_store(client: &reqwest::Client, srv: &TestServer, name: &str) -> String {
    let res = client
        .post(srv.url("/store/createStore"))
        .json(&json!({ "storeName": name, "address": "1 Main St", "managerName": "Dana" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_store_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    create_store(&client, &srv, "Central").await;

    let res = client
        .post(srv.url("/store/createStore"))
        .json(&json!({ "storeName": "Central", "address": "1 Main St", "managerName": "Lee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "duplicate");

    let res = client
        .post(srv.url("/store/createStore"))
        .json(&json!({ "storeName": " ", "address": "2 Main St", "managerName": "Lee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn add_then_order_through_the_channels() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let store = create_store(&client, &srv, "North").await;

    // Add
    let res = client
        .post(srv.url(&format!("/store/{store}/addPhones")))
        .json(&json!([
            { "model": "APPLE", "price": 999.99, "quantity": 5 },
            { "model": "google", "price": 499.0, "quantity": 3 }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let ack: Value = res.json().await.unwrap();
    assert_eq!(ack["phoneCount"], 2);
    let added = outcome_eventually(&client, &srv, ack["correlationId"].as_str().unwrap()).await;
    assert_eq!(added["status"], "completed");
    let items = added["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let a = items[0]["id"].as_str().unwrap().to_string();
    let b = items[1]["id"].as_str().unwrap().to_string();

    // Order: A succeeds, B asks for too much.
    let res = client
        .post(srv.url("/store/orderPhones"))
        .json(&json!({
            "storeId": store,
            "orders": [
                { "phoneId": a, "quantity": 2 },
                { "phoneId": b, "quantity": 999999 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let ack: Value = res.json().await.unwrap();
    let ordered = outcome_eventually(&client, &srv, ack["correlationId"].as_str().unwrap()).await;
    assert_eq!(ordered["status"], "partial");
    assert_eq!(ordered["failures"][0]["kind"], "insufficient_quantity");

    // Direct read reflects the applied line only.
    let res = client.get(srv.url(&format!("/inventory/id/{a}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let item: Value = res.json().await.unwrap();
    assert_eq!(item["quantity"], 3);
    assert_eq!(item["isAvailable"], true);

    let res = client.get(srv.url(&format!("/inventory/id/{b}"))).send().await.unwrap();
    let item: Value = res.json().await.unwrap();
    assert_eq!(item["quantity"], 3);
}

#[tokio::test]
async fn unknown_store_cannot_receive_phones() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/store/no-such-store/addPhones"))
        .json(&json!([{ "model": "APPLE", "price": 1.0, "quantity": 1 }]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_inventory_quantity_rules() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/inventory"))
        .json(&json!([{ "model": "SAMSUNG", "price": 300.0, "quantity": 2 }]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created[0]["id"].as_str().unwrap().to_string();

    let res = client
        .put(srv.url(&format!("/inventory/{id}/increase")))
        .header("X-Increase-Amount", "3")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let item: Value = res.json().await.unwrap();
    assert_eq!(item["quantity"], 5);

    let res = client
        .put(srv.url("/inventory/decrease"))
        .json(&json!({ "id": id, "value": 6 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = client
        .put(srv.url("/inventory/decrease"))
        .json(&json!({ "id": id, "value": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let item: Value = res.json().await.unwrap();
    assert_eq!(item["quantity"], 0);
    assert_eq!(item["isAvailable"], false);

    let res = client
        .put(srv.url(&format!("/inventory/{id}/increase")))
        .header("X-Increase-Amount", "0")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_by_ids_is_all_or_nothing() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/inventory"))
        .json(&json!([{ "model": "XIAOMI", "price": 199.0, "quantity": 1 }]))
        .send()
        .await
        .unwrap();
    let created: Value = res.json().await.unwrap();
    let id = created[0]["id"].as_str().unwrap().to_string();
    let missing = "01890a5d-ac96-774b-bcce-b302099a8057";

    let res = client
        .delete(srv.url(&format!("/inventory/ids?ids={id},{missing}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url(&format!("/inventory/id/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn store_delete_cascades_inventory() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let store = create_store(&client, &srv, "Closing").await;

    let res = client
        .post(srv.url(&format!("/store/{store}/addPhones")))
        .json(&json!([{ "model": "APPLE", "price": 10.0, "quantity": 1 }]))
        .send()
        .await
        .unwrap();
    let ack: Value = res.json().await.unwrap();
    outcome_eventually(&client, &srv, ack["correlationId"].as_str().unwrap()).await;

    let res = client.delete(srv.url(&format!("/store/{store}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let ack: Value = res.json().await.unwrap();
    let cascade = outcome_eventually(&client, &srv, ack["correlationId"].as_str().unwrap()).await;
    assert_eq!(cascade["status"], "completed");

    let res = client.get(srv.url(&format!("/store/{store}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = client
        .get(srv.url(&format!("/inventory/store/{store}")))
        .send()
        .await
        .unwrap();
    let items: Value = res.json().await.unwrap();
    assert!(items.as_array().unwrap().is_empty());

    // Deleting an id that does not exist is a no-op, not a dead letter.
    let res = client
        .delete(srv.url("/store/id/01890a5d-ac96-774b-bcce-b302099a8057"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let ack: Value = res.json().await.unwrap();
    let deleted = outcome_eventually(&client, &srv, ack["correlationId"].as_str().unwrap()).await;
    assert_eq!(deleted["status"], "completed");

    let res = client.get(srv.url("/requests/dead-letters")).send().await.unwrap();
    let letters: Value = res.json().await.unwrap();
    assert!(letters.as_array().unwrap().is_empty());
}
