use crate::api::api_error::ApiError;
use crate::api::server::AppState;
use crate::directory::DnsService;
use crate::error::Error;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/services/:type", put(register_service))
        .route(
            "/services/types/:type",
            get(find_service_names).delete(unregister_service),
        )
        .route(
            "/services/instances/:name",
            get(find_service_instances).delete(remove_instance),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

async fn register_service(
    State(state): State<AppState>,
    Path(service_type): Path<String>,
    WithRejection(Json(service), _): WithRejection<Json<DnsService>, ApiError>,
) -> Result<StatusCode, ApiError> {
    state.directory.reg_dns_srv(&service_type, &service).await?;
    tracing::info!("registered service instance '{}'", service.name);
    Ok(StatusCode::CREATED)
}

async fn find_service_names(
    State(state): State<AppState>,
    Path(service_type): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(
        state.directory.find_dns_srv_names(&service_type).await?,
    ))
}

async fn find_service_instances(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<DnsService>>, ApiError> {
    Ok(Json(state.directory.find_dns_srv_instances(&name).await?))
}

#[derive(Deserialize)]
struct UnregisterParams {
    name: Option<String>,
}

async fn unregister_service(
    State(state): State<AppState>,
    Path(service_type): Path<String>,
    Query(params): Query<UnregisterParams>,
) -> Result<StatusCode, ApiError> {
    let name = params.name.ok_or_else(|| {
        Error::BadRequest("required query parameter 'name' not found".to_string())
    })?;
    state.directory.rm_dns_srv(&service_type, &name).await?;
    tracing::info!("unregistered service instance '{name}'");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RemoveInstanceParams {
    server: Option<String>,
    port: Option<String>,
}

async fn remove_instance(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<RemoveInstanceParams>,
) -> Result<StatusCode, ApiError> {
    let server = params.server.ok_or_else(|| {
        Error::BadRequest("required query parameter 'server' not found".to_string())
    })?;
    let port = params.port.ok_or_else(|| {
        Error::BadRequest("required query parameter 'port' not found".to_string())
    })?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::WrongPort(format!("wrong port specified '{port}'")))?;

    state.directory.rm_instance(&name, &server, port).await?;
    tracing::info!("removed instance '{name}' at '{server}:{port}'");
    Ok(StatusCode::NO_CONTENT)
}
