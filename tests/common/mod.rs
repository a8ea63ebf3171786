#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use color_eyre::Result;
use serde_json::Value;
use serial_gate::{
    config::Config,
    connection::Connection,
    gate::Gate,
    mock::MockDevice,
    server::{self, Routes},
};
use tower::ServiceExt;

pub const ALICE: [u8; 4] = [10, 0, 0, 1];
pub const BOB: [u8; 4] = [10, 0, 0, 2];
pub const CAROL: [u8; 4] = [10, 0, 0, 3];

pub const NOT_REGISTERED: &str = "Not registered; only one connection at a time";

/// A gateway in front of a mock device, driven without a socket.
pub struct Gateway {
    pub router: Router,
    pub device: MockDevice,
    pub connection: Arc<Connection>,
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl Reply {
    pub fn message(&self) -> Option<&str> {
        self.body.as_ref()?.get("message")?.as_str()
    }

    pub fn data(&self) -> Option<&Value> {
        self.body.as_ref()?.get("data")
    }
}

impl Gateway {
    pub async fn new(device: MockDevice, config: Config) -> Result<Self> {
        Self::with_routes(device, config, Routes::builtins()).await
    }

    pub async fn with_routes(device: MockDevice, config: Config, routes: Routes) -> Result<Self> {
        serial_gate::logging::init(None).await;

        let connection = Arc::new(Connection::new(device.clone(), config.settings()));
        connection.connect().await?;

        let router = server::router(connection.clone(), Gate::new(), config, routes);

        Ok(Self {
            router,
            device,
            connection,
        })
    }

    /// An echoing device answering after a short while.
    pub async fn echo() -> Result<Self> {
        Self::new(
            MockDevice::echo("echo").with_delay(std::time::Duration::from_millis(200)),
            Config::default(),
        )
        .await
    }

    pub async fn request(
        &self,
        from: [u8; 4],
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<Reply> {
        request(self.router.clone(), from, method, uri, body).await
    }

    pub async fn get(&self, from: [u8; 4], uri: &str) -> Result<Reply> {
        self.request(from, Method::GET, uri, None).await
    }

    pub async fn post(&self, from: [u8; 4], uri: &str, body: Value) -> Result<Reply> {
        self.request(from, Method::POST, uri, Some(body)).await
    }

    pub async fn register(&self, from: [u8; 4]) -> Result<Reply> {
        self.get(from, "/register").await
    }

    pub async fn recall(&self, from: [u8; 4]) -> Result<Reply> {
        self.get(from, "/recall").await
    }
}

/// Send a request through the router.
///
/// Takes its own router, so it can be driven from a spawned task.
pub async fn request(
    router: Router,
    from: [u8; 4],
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<Reply> {
    let builder = Request::builder().method(method).uri(uri);

    let mut request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((from, 51000))));

    let response = router.oneshot(request).await?;
    let status = response.status();

    let bytes = hyper::body::to_bytes(response.into_body()).await?;
    let body = if bytes.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into())),
        )
    };

    Ok(Reply { status, body })
}
