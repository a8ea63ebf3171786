use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    routing::{get, post, MethodRouter},
    Extension, Router,
};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    connection::{Connection, SendOptions},
    error::Error,
    gate::Gate,
    handlers,
};

/// What every request handler can reach.
#[derive(Debug, Clone)]
pub(crate) struct AppState {
    pub(crate) connection: Arc<Connection>,
    pub(crate) gate: Gate,
    pub(crate) send_options: SendOptions,
    pub(crate) config: Arc<Config>,
}

/// Device routes which are there unless left out, see [`Routes::without_builtins`].
const BUILTIN_ROUTES: [&str; 8] = [
    "/send",
    "/receive",
    "/receive/all",
    "/get",
    "/send/get_first",
    "/get/wait",
    "/send/get",
    "/list_ports",
];

/// Routes which are always there, and never guarded.
const RESERVED_ROUTES: [&str; 4] = ["/register", "/recall", "/config", "/version"];

/// Which routes touching the device the gateway serves.
///
/// All of them are guarded by the gate.
/// Custom handlers reach the device through an `Extension<Arc<Connection>>`.
pub struct Routes {
    include_builtins: bool,
    custom: Vec<(String, MethodRouter)>,
}

impl Default for Routes {
    fn default() -> Self {
        Self::builtins()
    }
}

impl Routes {
    /// The built-in device routes.
    pub fn builtins() -> Self {
        Self {
            include_builtins: true,
            custom: vec![],
        }
    }

    /// No device routes, except the custom ones added.
    pub fn without_builtins() -> Self {
        Self {
            include_builtins: false,
            custom: vec![],
        }
    }

    /// Add a custom route.
    ///
    /// Fails if the path is reserved, already added, or taken by a built-in route.
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Result<Self, Error> {
        if !path.starts_with('/') {
            return Err(Error::BadConfig(format!(
                "Route paths must start with a `/`, got `{path}`"
            )));
        }

        if RESERVED_ROUTES.contains(&path) {
            return Err(Error::RouteReserved(path.into()));
        }

        let taken_by_builtin = self.include_builtins && BUILTIN_ROUTES.contains(&path);
        let taken_by_custom = self.custom.iter().any(|(existing, _)| existing == path);
        if taken_by_builtin || taken_by_custom {
            return Err(Error::RouteExists(path.into()));
        }

        debug!(%path, "Custom route added");
        self.custom.push((path.into(), method_router));

        Ok(self)
    }

    fn guarded(self) -> Option<Router> {
        if !self.include_builtins && self.custom.is_empty() {
            return None;
        }

        let router = if self.include_builtins {
            Router::new()
                .route("/send", post(handlers::send))
                .route(
                    "/receive",
                    get(handlers::receive_query).post(handlers::receive_json),
                )
                .route("/receive/all", get(handlers::receive_all))
                .route("/get", get(handlers::get))
                .route("/send/get_first", post(handlers::send_get_first))
                .route("/get/wait", post(handlers::wait))
                .route("/send/get", post(handlers::send_for_response))
                .route("/list_ports", get(handlers::list_ports))
        } else {
            Router::new()
        };

        let router = self
            .custom
            .into_iter()
            .fold(router, |router, (path, method_router)| {
                router.route(&path, method_router)
            });

        Some(router)
    }
}

/// The HTTP routes of the gateway.
///
/// Every route touching the device is guarded by the gate.
/// The connection should already be connected, see [`Connection::connect`].
pub fn router(connection: Arc<Connection>, gate: Gate, config: Config, routes: Routes) -> Router {
    let state = AppState {
        connection: connection.clone(),
        gate: gate.clone(),
        send_options: config.send_options(),
        config: Arc::new(config),
    };

    let router = match routes.guarded() {
        Some(guarded) => guarded
            // Only applies to the routes above
            .route_layer(middleware::from_fn(
                move |request: Request<Body>, next: Next<Body>| {
                    handlers::guard(gate.clone(), request, next)
                },
            )),
        None => Router::new(),
    };

    router
        .route("/register", get(handlers::register))
        .route("/recall", get(handlers::recall))
        .route("/config", get(handlers::show_config))
        .route("/version", get(handlers::show_version))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Handlers reach the device and gate through these
                .layer(Extension(state))
                .layer(Extension(connection)),
        )
}

async fn run<F>(
    config: Config,
    routes: Routes,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let connection = Arc::new(Connection::from_arc(
        config.device.transport(),
        config.settings(),
    ));
    connection.connect().await?;

    let app = router(connection.clone(), Gate::new(), config, routes);

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::Serve(format!("Could not bind to {addr}: {e}")))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody is waiting to hear which port was allocated");
        }
    }

    info!("Listening on {addr}");

    let result = server.with_graceful_shutdown(shutdown).await;

    info!("Shutting down");
    connection.disconnect().await;

    result.map_err(|e| Error::Serve(e.to_string()))
}

/// Start the server on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
/// Runs until `shutdown` completes.
pub async fn run_any_port<F>(
    config: Config,
    routes: Routes,
    allocated_port: oneshot::Sender<u16>,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    run(config, routes, None, Some(allocated_port), shutdown).await
}

/// Start the server on the given port.
/// Runs until `shutdown` completes.
pub async fn run_on_port<F>(
    config: Config,
    routes: Routes,
    port: u16,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    run(config, routes, Some(port), None, shutdown).await
}
