//! HTTP API 层
//!
//! 路由、OpenAPI 文档、中间件栈的装配点。业务逻辑在 service 层，
//! 这里只做请求编排和统一响应。

use std::{sync::Arc, time::Instant};

use axum::{
    extract::Request,
    http::{
        header::{CACHE_CONTROL, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
        HeaderValue, Method,
    },
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::Level;
use utoipa::{OpenApi, ToSchema};

use crate::{
    api::{middleware::trace_id_middleware, response::ApiResponse},
    app_state::AppState,
    error::AppError,
};

pub mod campaign_api;
pub mod middleware;
pub mod response; // 统一响应格式
pub mod session_api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api_health,
        session_api::get_session,
        session_api::connect_key,
        session_api::list_accounts,
        session_api::select_account,
        session_api::disconnect,
        session_api::refresh_balance,
        campaign_api::list_campaigns,
        campaign_api::list_donations,
        campaign_api::create_campaign,
        campaign_api::donate,
        campaign_api::user_history,
    ),
    components(
        schemas(
            HealthResponse,
            session_api::ConnectKeyReq,
            session_api::SelectAccountReq,
            campaign_api::CreateCampaignReq,
            campaign_api::DonateReq,
            crate::domain::session::SessionSnapshot,
            crate::domain::session::ConnectionKind,
            crate::domain::campaign::Campaign,
            crate::domain::campaign::Donation,
            crate::domain::campaign::TxOutcome,
            crate::service::session_manager::AccountSnapshot,
            crate::service::view_model::CampaignView,
            crate::service::view_model::DonatedCampaign,
            crate::service::view_model::UserHistory,
        )
    ),
    tags(
        (name = "FundCore API", description = "Auto-generated OpenAPI via utoipa")
    )
)]
struct ApiDoc;

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub chain_id: u64,
    pub contract_address: String,
    pub timestamp: i64,
}

/// GET /api/health
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = ApiResponse<HealthResponse>)
    ),
    tag = "Health"
)]
pub async fn api_health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthResponse>>, AppError> {
    response::success_response(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain_id: state.config.network.chain_id,
        contract_address: state.config.network.contract_address.clone(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

pub fn routes(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(api_health))
        .merge(session_api::routes())
        .merge(campaign_api::routes());

    Router::new()
        .nest("/api", api)
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .route(
            "/metrics",
            get(|| async { crate::metrics::render_prometheus().into_response() }),
        )
        .with_state(state.clone())
        .layer(cors_layer(
            state.config.server.cors_allow_origins.as_deref(),
        ))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(trace_id_middleware))
                .layer(from_fn(add_security_headers))
                .layer(from_fn(trace_log)),
        )
}

/// 按配置构造 CORS 层
///
/// 配置为逗号分隔的来源列表；缺省或含 "*" 时放开全部来源。
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match origins {
        Some(list) if !list.split(',').any(|o| o.trim() == "*") => {
            let parsed: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
                .collect();
            layer.allow_origin(AllowOrigin::list(parsed))
        }
        _ => layer.allow_origin(Any),
    }
}

async fn add_security_headers(req: Request, next: axum::middleware::Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    resp
}

async fn trace_log(req: Request, next: axum::middleware::Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let trace_id = req
        .extensions()
        .get::<String>()
        .cloned()
        .unwrap_or_else(|| "-".to_string());
    let resp = next.run(req).await;
    let status = resp.status();
    let elapsed = start.elapsed().as_millis();
    tracing::event!(Level::INFO, trace_id=%trace_id, method=%method, path=%path, status=%status.as_u16(), elapsed_ms=%elapsed, "http_request");
    resp
}
