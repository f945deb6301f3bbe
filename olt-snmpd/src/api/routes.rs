use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    http::Method,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as CorsAny, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use shared::protocol::{API_PREFIX, PAGE_SIZE_VAR, PAGE_VAR};
use shared::types::{OnuDetail, OnuSlot, OnuSummary};
use crate::usecase::OnuService;
use super::{ApiError, PagedResponse, WebResponse};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OnuService>,
}

#[derive(Deserialize)]
pub struct PortPath {
    pub board: u8,
    pub pon: u8,
}

#[derive(Deserialize)]
pub struct OnuPath {
    pub board: u8,
    pub pon: u8,
    pub onu_id: u32,
}

type ApiResult<T> = Result<WebResponse<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    let board = Router::new()
        .route("/board/:board/pon/:pon", get(list_by_port))
        .route("/board/:board/pon/:pon/onu/:onu_id", get(detail))
        .route("/board/:board/pon/:pon/onu_id/empty", get(free_slots))
        .route("/board/:board/pon/:pon/onu_id/update", get(refresh_free_slots))
        .route("/board/:board/page/pon/:pon", get(paged_list_by_port));

    let app = Router::new()
        .route("/", get(root))
        .nest(API_PREFIX, board)
        .with_state(state);

    with_middleware(app)
}

/// Request logging, CORS and panic recovery, applied to every route.
/// Panics are caught innermost so the trace layer logs the resulting 500.
pub fn with_middleware(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(CorsAny)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers(CorsAny),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);
    ApiError::internal("internal server error").into_response()
}

fn path<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(inner)| inner)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Missing or non-numeric values fall through to the pager's defaults
fn query_number(params: &HashMap<String, String>, name: &str) -> Option<i64> {
    params.get(name).and_then(|value| value.trim().parse().ok())
}

async fn root() -> &'static str {
    "Hello, this is the root endpoint!"
}

async fn list_by_port(
    State(state): State<AppState>,
    port: Result<Path<PortPath>, PathRejection>,
) -> ApiResult<Vec<OnuSummary>> {
    let PortPath { board, pon } = path(port)?;
    let list = state.service.list_by_port(board, pon).await?;
    Ok(WebResponse::ok(list))
}

async fn detail(
    State(state): State<AppState>,
    onu: Result<Path<OnuPath>, PathRejection>,
) -> ApiResult<OnuDetail> {
    let OnuPath { board, pon, onu_id } = path(onu)?;
    state
        .service
        .detail_by_port_and_slot(board, pon, onu_id)
        .await?
        .map(WebResponse::ok)
        .ok_or_else(|| {
            ApiError::not_found(format!("no ONU {} on board {} pon {}", onu_id, board, pon))
        })
}

async fn free_slots(
    State(state): State<AppState>,
    port: Result<Path<PortPath>, PathRejection>,
) -> ApiResult<Vec<OnuSlot>> {
    let PortPath { board, pon } = path(port)?;
    let slots = state.service.free_slots(board, pon).await?;
    Ok(WebResponse::ok(slots))
}

async fn refresh_free_slots(
    State(state): State<AppState>,
    port: Result<Path<PortPath>, PathRejection>,
) -> ApiResult<Vec<OnuSlot>> {
    let PortPath { board, pon } = path(port)?;
    let slots = state.service.refresh_free_slots(board, pon).await?;
    tracing::info!("Refreshed free slots for board {} pon {}: {} free", board, pon, slots.len());
    Ok(WebResponse::ok(slots))
}

async fn paged_list_by_port(
    State(state): State<AppState>,
    port: Result<Path<PortPath>, PathRejection>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<PagedResponse<OnuSummary>, ApiError> {
    let PortPath { board, pon } = path(port)?;
    let page = state
        .service
        .paged_list_by_port(
            board,
            pon,
            query_number(&params, PAGE_VAR),
            query_number(&params, PAGE_SIZE_VAR),
        )
        .await?;
    Ok(PagedResponse::ok(page))
}
