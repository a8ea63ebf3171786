mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use serial_gate::{config::Config, mock::MockDevice, serial::codecs::Framing};

fn lines() -> Config {
    Config {
        framing: Framing::Lines { delimiter: '\n' },
        ..Default::default()
    }
}

async fn silent() -> Result<Gateway> {
    let gateway = Gateway::new(MockDevice::silent("silent"), lines()).await?;
    gateway.register(ALICE).await?;

    Ok(gateway)
}

async fn wait_for_records(gateway: &Gateway, count: u64) {
    while gateway.connection.history().len().await < count {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn second_send_too_soon_fails() -> Result<()> {
    let config = Config {
        send_interval_ms: 1000,
        ..Default::default()
    };
    let gateway = Gateway::new(MockDevice::silent("throttled"), config).await?;
    gateway.register(ALICE).await?;

    let reply = gateway.post(ALICE, "/send", json!({"data": ["a"]})).await?;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = gateway.post(ALICE, "/send", json!({"data": ["b"]})).await?;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.message(), Some("Failed to send"));

    Ok(())
}

#[tokio::test]
async fn malformed_requests() -> Result<()> {
    let gateway = silent().await?;

    let bodies = [
        json!({"data": ["a"], "notanarg": "notanarg"}),
        json!({"data": [["nested"]]}),
        json!({"data": [{"an": "object"}]}),
        json!({"data": []}),
        json!({"ending": "\n"}),
    ];

    for body in bodies {
        let reply = gateway.post(ALICE, "/send", body.clone()).await?;

        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{body}");
        assert!(
            reply.message().unwrap().starts_with("Malformed request"),
            "{body}"
        );
    }

    let reply = gateway.get(ALICE, "/get?timeout=-1").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = gateway.get(ALICE, "/receive?num_before=many").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = gateway
        .post(
            ALICE,
            "/send/get",
            json!({"response": "x", "data": ["x"], "send_interval": 0}),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    assert!(gateway.device.received().is_empty());

    Ok(())
}

#[tokio::test]
async fn receive_looks_back() -> Result<()> {
    let gateway = silent().await?;

    let reply = gateway.get(ALICE, "/receive").await?;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_none());

    gateway.device.inject("one\ntwo\n  three  \n");
    wait_for_records(&gateway, 3).await;

    let reply = gateway.get(ALICE, "/receive").await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.data(), Some(&json!("three")));

    let reply = gateway.get(ALICE, "/receive?strip=false").await?;
    assert_eq!(reply.data(), Some(&json!("  three  ")));

    let reply = gateway.get(ALICE, "/receive?num_before=2").await?;
    assert_eq!(reply.data(), Some(&json!("one")));

    let reply = gateway
        .post(ALICE, "/receive", json!({"num_before": 1}))
        .await?;
    assert_eq!(reply.data(), Some(&json!("two")));

    let reply = gateway.get(ALICE, "/receive?num_before=3").await?;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn receive_all_in_order() -> Result<()> {
    let gateway = silent().await?;

    let reply = gateway.get(ALICE, "/receive/all").await?;
    assert_eq!(reply.data(), Some(&json!([])));

    gateway.device.inject("first\nsecond\nthird:rest\n");
    wait_for_records(&gateway, 3).await;

    let reply = gateway.get(ALICE, "/receive/all").await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.data(), Some(&json!(["first", "second", "third:rest"])));

    let reply = gateway.get(ALICE, "/receive/all?read_until=:").await?;
    assert_eq!(reply.data(), Some(&json!(["first", "second", "third"])));

    Ok(())
}

#[tokio::test]
async fn get_times_out() -> Result<()> {
    let gateway = silent().await?;

    let reply = gateway.get(ALICE, "/get?timeout=0.2").await?;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.message(), Some("Timed out waiting for the device"));

    Ok(())
}

#[tokio::test]
async fn send_get_first_skips_older_records() -> Result<()> {
    let gateway = Gateway::new(MockDevice::echo("echo"), lines()).await?;
    gateway.register(ALICE).await?;

    gateway.device.inject("boot banner\n");
    wait_for_records(&gateway, 1).await;

    let reply = gateway
        .post(ALICE, "/send/get_first", json!({"data": ["ping"]}))
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.data(), Some(&json!(r#"Got: "ping""#)));

    Ok(())
}

#[tokio::test]
async fn wait_for_a_response() -> Result<()> {
    let gateway = silent().await?;

    let device = gateway.device.clone();
    let injector = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        device.inject("noise\n");
        device.inject("PONG\r\n");
    });

    let reply = gateway
        .post(ALICE, "/get/wait", json!({"response": "PONG", "timeout": 2}))
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    injector.await?;

    let reply = gateway
        .post(ALICE, "/get/wait", json!({"response": "PONG", "timeout": 0.2}))
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);

    Ok(())
}

#[tokio::test]
async fn send_until_expected_response() -> Result<()> {
    let gateway = silent().await?;

    let device = gateway.device.clone();
    let injector = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        device.inject("READY\n");
    });

    let reply = gateway
        .post(
            ALICE,
            "/send/get",
            json!({"response": "READY", "data": ["status?"], "send_interval": 0.15, "timeout": 2}),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    injector.await?;

    assert!(gateway.device.received().len() >= 2);

    let reply = gateway
        .post(
            ALICE,
            "/send/get",
            json!({"response": "never", "data": ["status?"], "send_interval": 0.15, "timeout": 0.5}),
        )
        .await?;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.message(), Some("Timed out waiting for the device"));

    Ok(())
}

#[tokio::test]
async fn unplugging_wakes_blocked_callers() -> Result<()> {
    let gateway = silent().await?;

    let blocked = {
        let router = gateway.router.clone();
        tokio::spawn(async move {
            request(router, ALICE, Method::GET, "/get?timeout=10", None).await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gateway.device.unplug());

    let reply = tokio::time::timeout(Duration::from_secs(2), blocked).await???;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
    assert_eq!(reply.message(), Some("Not connected to the device"));

    let reply = gateway.post(ALICE, "/send", json!({"data": ["x"]})).await?;
    assert_eq!(reply.status, StatusCode::BAD_GATEWAY);

    // Registering again brings the device back.
    gateway.recall(ALICE).await?;
    assert_eq!(gateway.register(ALICE).await?.status, StatusCode::OK);
    let reply = gateway.post(ALICE, "/send", json!({"data": ["x"]})).await?;
    assert_eq!(reply.status, StatusCode::OK);

    Ok(())
}
