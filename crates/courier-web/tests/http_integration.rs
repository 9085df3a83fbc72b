use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use courier_web::config::{ServerConfig, SessionTuning};
use courier_web::server;
use libcourier::client::ClientFactory;
use libcourier::loopback::{GroupFixture, LoopbackConfig, LoopbackFactory, ParticipantFixture};

/// Bind the full router on an ephemeral port over a loopback transport.
async fn spawn_server(loopback: LoopbackConfig) -> (String, Arc<LoopbackFactory>) {
    let config = ServerConfig {
        session: SessionTuning {
            verify_delay_ms: 20,
            settle_delay_ms: 1,
        },
        ..ServerConfig::default()
    };
    let factory = Arc::new(LoopbackFactory::new(loopback));
    let state = server::build_state(&config, Arc::clone(&factory) as Arc<dyn ClientFactory>);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), factory)
}

async fn wait_for<F, Fut>(mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn fixtures() -> Vec<GroupFixture> {
    vec![
        GroupFixture::new("sales@g.us", "Sales")
            .with_participant(ParticipantFixture::new("111111111@c.us", Some("P1")))
            .with_participant(ParticipantFixture::new("222222222@c.us", Some("P2"))),
        GroupFixture::new("support@g.us", "Support")
            .with_participant(ParticipantFixture::new("222222222@c.us", Some("P2")))
            .with_participant(ParticipantFixture::new("333333333@c.us", Some("P3"))),
    ]
}

#[tokio::test]
async fn full_session_flow_over_http() {
    let (base, factory) = spawn_server(
        LoopbackConfig::manual()
            .with_own_id("999999999@c.us")
            .with_groups(fixtures()),
    )
    .await;
    let http = reqwest::Client::new();

    // Initialize: immediate acknowledgment, connection happens behind it.
    let resp = http
        .post(format!("{base}/session/init"))
        .json(&json!({"tenant_id": "acme"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "initializing");
    assert_eq!(body["tenant_id"], "acme");

    assert!(wait_for(|| async { factory.client("acme").is_some() }).await);
    let client = factory.client("acme").unwrap();

    // Pairing code shows up in the status poll, cleared once connected.
    client.emit_pairing_code("ABC123");
    assert!(
        wait_for(|| async {
            let status: Value = http
                .get(format!("{base}/session/status/acme"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            status["pairing_code"] == "ABC123" && status["connected"] == false
        })
        .await
    );

    client.go_online();
    assert!(
        wait_for(|| async {
            let status: Value = http
                .get(format!("{base}/session/status/acme"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            status["connected"] == true && status["pairing_code"].is_null()
        })
        .await
    );

    // Discovery.
    let groups: Value = http
        .get(format!("{base}/session/groups/acme"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(groups["groups"].as_array().unwrap().len(), 2);

    let contacts: Value = http
        .get(format!("{base}/session/contacts/acme?refresh=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(contacts["total"], 3);
    let p2 = contacts["contacts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["identifier"] == "222222222")
        .expect("P2 present");
    assert_eq!(p2["groups"].as_array().unwrap().len(), 2);

    // Dispatch: text succeeds even though every image primitive fails.
    client.fail_primitive("image");
    client.fail_primitive("file");
    client.fail_primitive("media");
    let sent: Value = http
        .post(format!("{base}/session/send/acme"))
        .json(&json!({
            "destination": "222222222@c.us",
            "text": "hi",
            "image": "https://example.test/pic.png",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sent["success"], true);
    assert_eq!(sent["text_result"]["status"], "sent");
    assert_eq!(sent["image_result"]["status"], "failed");

    // Session listing.
    let list: Value = http
        .get(format!("{base}/session/list"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["total"], 1);
    assert_eq!(list["sessions"][0]["tenant_id"], "acme");

    // Disconnect, then the status is the never-initialized default.
    let resp: Value = http
        .post(format!("{base}/session/disconnect/acme"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["success"], true);

    let status: Value = http
        .get(format!("{base}/session/status/acme"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connected"], false);
    assert!(status["pairing_code"].is_null());
}

#[tokio::test]
async fn automatic_pairing_connects_without_scripting() {
    let (base, _factory) = spawn_server(LoopbackConfig {
        pairing_delay: Duration::from_millis(5),
        connect_delay: Duration::from_millis(10),
        ..LoopbackConfig::default()
    })
    .await;
    let http = reqwest::Client::new();

    http.post(format!("{base}/session/init"))
        .json(&json!({"tenant_id": "auto"}))
        .send()
        .await
        .unwrap();

    assert!(
        wait_for(|| async {
            let status: Value = http
                .get(format!("{base}/session/status/auto"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            status["connected"] == true
        })
        .await
    );
}

#[tokio::test]
async fn send_to_file_endpoint_reports_primitive() {
    let (base, factory) = spawn_server(LoopbackConfig::manual()).await;
    let http = reqwest::Client::new();

    http.post(format!("{base}/session/init"))
        .json(&json!({"tenant_id": "acme"}))
        .send()
        .await
        .unwrap();
    assert!(wait_for(|| async { factory.client("acme").is_some() }).await);
    factory.client("acme").unwrap().go_online();

    let body: Value = http
        .post(format!("{base}/session/send-file/acme"))
        .json(&json!({
            "destination": "sales@g.us",
            "file_url": "https://example.test/report.pdf",
            "options": {"caption": "Q3 numbers"},
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["status"], "sent");
    assert_eq!(body["result"]["primitive"], "file");
}

#[tokio::test]
async fn caller_input_errors_are_synchronous() {
    let (base, _factory) = spawn_server(LoopbackConfig::manual()).await;
    let http = reqwest::Client::new();

    // Empty tenant id.
    let resp = http
        .post(format!("{base}/session/init"))
        .json(&json!({"tenant_id": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid_request");

    // Neither text nor image.
    let resp = http
        .post(format!("{base}/session/send/ghost"))
        .json(&json!({"destination": "1@c.us"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    // Valid body, unknown tenant.
    let resp = http
        .post(format!("{base}/session/send/ghost"))
        .json(&json!({"destination": "1@c.us", "text": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    // Status for a tenant that never initialized: a default, not an error.
    let status: Value = http
        .get(format!("{base}/session/status/ghost"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connected"], false);
    assert!(status["pairing_code"].is_null());
}
