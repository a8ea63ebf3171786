mod common;

use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    routing::{get, post},
    Extension,
};
use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use serial_gate::{
    config::Config, connection::Connection, error::Error, mock::MockDevice, server::Routes,
};

async fn newest(Extension(connection): Extension<Arc<Connection>>) -> String {
    match connection.receive(0).await {
        Ok(Some(record)) => record.decode(None),
        Ok(None) => "nothing yet".into(),
        Err(e) => e.to_string(),
    }
}

async fn hello() -> &'static str {
    "hello"
}

#[tokio::test]
async fn custom_routes_are_guarded() -> Result<()> {
    let routes = Routes::builtins().route("/newest", get(newest))?;
    let gateway =
        Gateway::with_routes(MockDevice::silent("custom"), Config::default(), routes).await?;

    let reply = gateway.get(ALICE, "/newest").await?;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.message(), Some(NOT_REGISTERED));

    gateway.register(ALICE).await?;

    let reply = gateway.get(ALICE, "/newest").await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, Some(serde_json::json!("nothing yet")));

    // Built-ins are still there.
    assert_eq!(
        gateway.get(ALICE, "/receive/all").await?.status,
        StatusCode::OK
    );

    Ok(())
}

#[tokio::test]
async fn reserved_routes_are_refused() {
    for path in ["/register", "/recall", "/version", "/config"] {
        assert!(matches!(
            Routes::builtins().route(path, get(hello)),
            Err(Error::RouteReserved(p)) if p == path
        ));
        assert!(matches!(
            Routes::without_builtins().route(path, get(hello)),
            Err(Error::RouteReserved(_))
        ));
    }
}

#[tokio::test]
async fn duplicate_routes_are_refused() -> Result<()> {
    let routes = Routes::without_builtins().route("/hello", get(hello))?;
    assert!(matches!(
        routes.route("/hello", post(hello)),
        Err(Error::RouteExists(p)) if p == "/hello"
    ));

    assert!(matches!(
        Routes::builtins().route("/send", post(hello)),
        Err(Error::RouteExists(_))
    ));

    assert!(matches!(
        Routes::builtins().route("no-slash", get(hello)),
        Err(Error::BadConfig(_))
    ));

    Ok(())
}

#[tokio::test]
async fn builtins_can_be_left_out() -> Result<()> {
    // Without built-ins, their paths are free to take.
    let routes = Routes::without_builtins().route("/send", post(hello))?;
    let gateway =
        Gateway::with_routes(MockDevice::echo("bare"), Config::default(), routes).await?;

    gateway.register(ALICE).await?;

    let reply = gateway
        .request(ALICE, Method::POST, "/send", None)
        .await?;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, Some(serde_json::json!("hello")));
    assert!(gateway.device.received().is_empty());

    assert_eq!(gateway.get(ALICE, "/get").await?.status, StatusCode::NOT_FOUND);

    // The gate still works.
    gateway.recall(ALICE).await?;
    assert_eq!(
        gateway.request(ALICE, Method::POST, "/send", None).await?.status,
        StatusCode::BAD_REQUEST
    );

    Ok(())
}

#[tokio::test]
async fn nothing_but_the_gate() -> Result<()> {
    let gateway = Gateway::with_routes(
        MockDevice::echo("empty"),
        Config::default(),
        Routes::without_builtins(),
    )
    .await?;

    assert_eq!(gateway.register(ALICE).await?.status, StatusCode::OK);
    assert_eq!(gateway.get(ALICE, "/get").await?.status, StatusCode::NOT_FOUND);
    assert_eq!(gateway.get(ALICE, "/version").await?.status, StatusCode::OK);

    Ok(())
}
