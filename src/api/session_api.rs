//! 钱包会话 API
//!
//! 会话状态机只有两态：未连接 / 已连接（带连接方式）。所有接口返回
//! 当前会话快照，变更接口失败时会话保持原状。

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    api::response::{success_response, ApiResponse},
    app_state::AppState,
    domain::session::SessionSnapshot,
    error::AppError,
    metrics,
    service::session_manager::AccountSnapshot,
};

/// 私钥连接请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectKeyReq {
    /// 32 字节十六进制私钥，0x 前缀可选
    pub private_key: String,
}

/// 本地账户选择请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectAccountReq {
    /// 账户在列表中的下标（从 0 起）
    pub index: usize,
}

/// GET /api/session
///
/// 查询当前会话快照，未连接时 address 为 null
#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Current session snapshot", body = ApiResponse<SessionSnapshot>)
    ),
    tag = "Session"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, AppError> {
    metrics::count_ok("session_get");
    success_response(state.sessions.snapshot().await)
}

/// POST /api/session/connect-key
///
/// 用原始私钥建立会话（测试网专用路径）
#[utoipa::path(
    post,
    path = "/api/session/connect-key",
    request_body = ConnectKeyReq,
    responses(
        (status = 200, description = "Session established", body = ApiResponse<SessionSnapshot>),
        (status = 400, description = "Key material is not a valid private key"),
        (status = 503, description = "No RPC endpoint configured")
    ),
    tag = "Session"
)]
pub async fn connect_key(
    State(state): State<Arc<AppState>>,
    trace: Option<Extension<String>>,
    Json(req): Json<ConnectKeyReq>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, AppError> {
    let snapshot = state
        .sessions
        .connect_via_key(&req.private_key)
        .await
        .map_err(|e| {
            metrics::count_err("session_connect_key");
            e.traced(&trace)
        })?;
    metrics::count_ok("session_connect_key");
    tracing::info!(address = ?snapshot.address, "session connected via raw key");
    success_response(snapshot)
}

/// GET /api/session/accounts
///
/// 列出配置的本地测试账户（带余额），未配置时返回空列表
#[utoipa::path(
    get,
    path = "/api/session/accounts",
    responses(
        (status = 200, description = "Configured local accounts", body = Vec<AccountSnapshot>),
        (status = 503, description = "No RPC endpoint configured")
    ),
    tag = "Session"
)]
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    trace: Option<Extension<String>>,
) -> Result<Json<ApiResponse<Vec<AccountSnapshot>>>, AppError> {
    let accounts = state
        .sessions
        .list_local_accounts()
        .await
        .map_err(|e| {
            metrics::count_err("session_accounts");
            e.traced(&trace)
        })?;
    metrics::count_ok("session_accounts");
    success_response(accounts)
}

/// POST /api/session/accounts/select
///
/// 切换到某个本地账户；下标越界时报错且会话不变
#[utoipa::path(
    post,
    path = "/api/session/accounts/select",
    request_body = SelectAccountReq,
    responses(
        (status = 200, description = "Session switched to selected account", body = ApiResponse<SessionSnapshot>),
        (status = 400, description = "Index out of range")
    ),
    tag = "Session"
)]
pub async fn select_account(
    State(state): State<Arc<AppState>>,
    trace: Option<Extension<String>>,
    Json(req): Json<SelectAccountReq>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, AppError> {
    let snapshot = state
        .sessions
        .select_account(req.index)
        .await
        .map_err(|e| {
            metrics::count_err("session_select");
            e.traced(&trace)
        })?;
    metrics::count_ok("session_select");
    tracing::info!(index = req.index, address = ?snapshot.address, "local account selected");
    success_response(snapshot)
}

/// POST /api/session/disconnect
///
/// 断开会话（幂等，未连接时也返回成功）
#[utoipa::path(
    post,
    path = "/api/session/disconnect",
    responses(
        (status = 200, description = "Session cleared", body = ApiResponse<SessionSnapshot>)
    ),
    tag = "Session"
)]
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, AppError> {
    state.sessions.disconnect().await;
    metrics::count_ok("session_disconnect");
    tracing::info!("session disconnected");
    success_response(state.sessions.snapshot().await)
}

/// POST /api/session/refresh-balance
///
/// 重新拉取当前地址余额；未连接时原样返回未连接快照
#[utoipa::path(
    post,
    path = "/api/session/refresh-balance",
    responses(
        (status = 200, description = "Refreshed session snapshot", body = ApiResponse<SessionSnapshot>),
        (status = 502, description = "RPC endpoint unreachable")
    ),
    tag = "Session"
)]
pub async fn refresh_balance(
    State(state): State<Arc<AppState>>,
    trace: Option<Extension<String>>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, AppError> {
    let snapshot = state
        .sessions
        .refresh_balance()
        .await
        .map_err(|e| {
            metrics::count_err("session_refresh");
            e.traced(&trace)
        })?;
    metrics::count_ok("session_refresh");
    success_response(snapshot)
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/connect-key", post(connect_key))
        .route("/session/accounts", get(list_accounts))
        .route("/session/accounts/select", post(select_account))
        .route("/session/disconnect", post(disconnect))
        .route("/session/refresh-balance", post(refresh_balance))
}
