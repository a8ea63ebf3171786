use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ConnectInfo, Query,
    },
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json, TypedHeader,
};
use tracing::{debug, info, warn};

use crate::{
    actions::{
        seconds, AllRecordsReply, GetFirstRequest, GetRequest, ReceiveRequest, RecordReply, Reply,
        SendForResponseRequest, SendRequest, TextRequest, WaitRequest,
    },
    error::Error,
    gate::Gate,
    serial,
    server::AppState,
    user::User,
};

fn json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Error> {
    body.map(|Json(request)| request)
        .map_err(|rejection| Error::MalformedRequest(rejection.to_string()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Error> {
    params
        .map(|Query(request)| request)
        .map_err(|rejection| Error::MalformedRequest(rejection.to_string()))
}

/// Reject device requests while nobody is registered.
pub(crate) async fn guard(gate: Gate, request: Request<Body>, next: Next<Body>) -> Response {
    match gate.guard(|| next.run(request)).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

pub(crate) async fn register(
    Extension(state): Extension<AppState>,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<Reply>, Error> {
    let user = User::from(addr.ip());

    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` wants to register", user_agent.as_str());
    }

    state.gate.register(&user).await?;

    // Only the new occupant may bring back a device which went away.
    if !state.connection.is_open() {
        if let Err(e) = state.connection.connect().await {
            warn!(%user, %e, "Registered, but the device is still gone");
        }
    }

    Ok(Json(Reply::ok()))
}

pub(crate) async fn recall(
    Extension(state): Extension<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<Reply>, Error> {
    let user = User::from(addr.ip());
    let previous = state.gate.recall(&user).await?;
    debug!(%previous, "Freed");

    Ok(Json(Reply::ok()))
}

pub(crate) async fn send(
    Extension(state): Extension<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<Reply>, Error> {
    let request = json(body)?;
    let (fields, options) = request.parts(&state.send_options)?;

    state.connection.send(&fields, &options).await?;

    Ok(Json(Reply::ok()))
}

async fn receive_one(state: &AppState, request: ReceiveRequest) -> Result<Response, Error> {
    let response = match state.connection.receive(request.num_before).await? {
        Some(record) => Json(RecordReply::new(
            &record,
            request.read_until.as_deref(),
            request.strip,
        ))
        .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };

    Ok(response)
}

pub(crate) async fn receive_query(
    Extension(state): Extension<AppState>,
    params: Result<Query<ReceiveRequest>, QueryRejection>,
) -> Result<Response, Error> {
    receive_one(&state, query(params)?).await
}

pub(crate) async fn receive_json(
    Extension(state): Extension<AppState>,
    body: Result<Json<ReceiveRequest>, JsonRejection>,
) -> Result<Response, Error> {
    receive_one(&state, json(body)?).await
}

pub(crate) async fn receive_all(
    Extension(state): Extension<AppState>,
    params: Result<Query<TextRequest>, QueryRejection>,
) -> Result<Json<AllRecordsReply>, Error> {
    let request = query(params)?;
    let records = state.connection.receive_all().await?;

    Ok(Json(AllRecordsReply::new(
        &records,
        request.read_until.as_deref(),
        request.strip,
    )))
}

pub(crate) async fn get(
    Extension(state): Extension<AppState>,
    params: Result<Query<GetRequest>, QueryRejection>,
) -> Result<Json<RecordReply>, Error> {
    let request = query(params)?;
    let timeout = seconds(request.timeout, state.connection.settings().timeout)?;

    let record = state
        .connection
        .get(timeout)
        .await?
        .ok_or(Error::Timeout)?;

    Ok(Json(RecordReply::new(
        &record,
        request.read_until.as_deref(),
        request.strip,
    )))
}

pub(crate) async fn send_get_first(
    Extension(state): Extension<AppState>,
    body: Result<Json<GetFirstRequest>, JsonRejection>,
) -> Result<Json<RecordReply>, Error> {
    let request = json(body)?;
    let (fields, options) = request.parts(&state.send_options)?;
    let timeout = seconds(request.timeout, state.connection.settings().timeout)?;

    let record = state
        .connection
        .get_first_response(&fields, &options, timeout)
        .await?
        .ok_or(Error::Timeout)?;

    Ok(Json(RecordReply::new(
        &record,
        request.read_until.as_deref(),
        request.strip,
    )))
}

pub(crate) async fn wait(
    Extension(state): Extension<AppState>,
    body: Result<Json<WaitRequest>, JsonRejection>,
) -> Result<Json<Reply>, Error> {
    let request = json(body)?;
    let timeout = seconds(request.timeout, state.connection.settings().timeout)?;

    if state
        .connection
        .wait_for_response(&request.expected(), timeout, request.strip)
        .await?
    {
        Ok(Json(Reply::ok()))
    } else {
        Err(Error::Timeout)
    }
}

pub(crate) async fn send_for_response(
    Extension(state): Extension<AppState>,
    body: Result<Json<SendForResponseRequest>, JsonRejection>,
) -> Result<Json<Reply>, Error> {
    let request = json(body)?;
    let (fields, options) = request.parts(&state.send_options)?;

    let settings = state.connection.settings();
    let timeout = seconds(request.timeout, settings.timeout)?;
    let send_interval = seconds(request.send_interval, settings.send_interval)?;

    if send_interval.is_zero() {
        return Err(Error::MalformedRequest(
            "The send interval must be positive".into(),
        ));
    }

    if state
        .connection
        .send_for_response(
            &request.expected(),
            &fields,
            &options,
            send_interval,
            timeout,
            request.strip,
        )
        .await?
    {
        Ok(Json(Reply::ok()))
    } else {
        Err(Error::Timeout)
    }
}

pub(crate) async fn list_ports() -> Result<Json<Vec<String>>, Error> {
    Ok(Json(serial::list_ports()?))
}

pub(crate) async fn show_config(Extension(state): Extension<AppState>) -> impl IntoResponse {
    state.config.serialize_pretty()
}

pub(crate) async fn show_version() -> impl IntoResponse {
    format!("Serial Gate v{}\n", env!("CARGO_PKG_VERSION"))
}
