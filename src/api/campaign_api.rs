//! 众筹活动 API
//!
//! 读接口对所有人开放（无会话走只读端点，失败降级为空列表）；
//! 写接口要求已连接会话，否则在进入网关前就以 not_connected 拒绝。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    api::response::{success_response, ApiResponse},
    app_state::AppState,
    domain::campaign::{Donation, TxOutcome},
    error::{classify_chain_error, AppError},
    metrics,
    service::{
        contract_gateway::CreateCampaignParams,
        view_model::{enrich_campaign, rollup_user_history, CampaignView, UserHistory},
    },
    utils::validate_evm_address,
};

/// 创建活动请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCampaignReq {
    pub title: String,
    pub description: String,
    /// 目标金额（ether 十进制字符串，如 "1.5"）
    pub target: String,
    /// 截止时间（epoch 毫秒）
    pub deadline: u64,
    /// 封面图 URL
    #[serde(default)]
    pub image: String,
}

/// 捐款请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct DonateReq {
    /// 捐款金额（ether 十进制字符串）
    pub amount: String,
}

/// GET /api/campaigns
///
/// 列出全部众筹活动，带进度百分比和剩余天数。链上读失败时返回
/// 空列表而不是错误。
#[utoipa::path(
    get,
    path = "/api/campaigns",
    responses(
        (status = 200, description = "All campaigns with derived view fields", body = Vec<CampaignView>)
    ),
    tag = "Campaigns"
)]
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<CampaignView>>>, AppError> {
    let connected = state.sessions.snapshot().await.address.is_some();
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let campaigns = state
        .gateway
        .list_campaigns(connected)
        .await
        .into_iter()
        .map(|c| enrich_campaign(c, now_ms))
        .collect::<Vec<_>>();
    metrics::count_ok("campaigns_list");
    success_response(campaigns)
}

/// GET /api/campaigns/:id/donations
///
/// 列出某活动的捐赠记录（时间戳为估算值）
#[utoipa::path(
    get,
    path = "/api/campaigns/{id}/donations",
    params(("id" = u64, Path, description = "Campaign id (on-chain index)")),
    responses(
        (status = 200, description = "Donations for the campaign", body = Vec<Donation>)
    ),
    tag = "Campaigns"
)]
pub async fn list_donations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ApiResponse<Vec<Donation>>>, AppError> {
    let connected = state.sessions.snapshot().await.address.is_some();
    let donations = state.gateway.list_donators(id, connected).await;
    metrics::count_ok("campaign_donations");
    success_response(donations)
}

/// POST /api/campaigns
///
/// 创建众筹活动。owner 取自当前会话地址，提交后等待一次链上确认。
#[utoipa::path(
    post,
    path = "/api/campaigns",
    request_body = CreateCampaignReq,
    responses(
        (status = 200, description = "Campaign created and confirmed", body = ApiResponse<TxOutcome>),
        (status = 400, description = "Invalid parameters, insufficient funds, or contract revert"),
        (status = 409, description = "No wallet session"),
        (status = 502, description = "RPC endpoint unreachable")
    ),
    tag = "Campaigns"
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    trace: Option<Extension<String>>,
    Json(req): Json<CreateCampaignReq>,
) -> Result<Json<ApiResponse<TxOutcome>>, AppError> {
    validate_create_req(&req).map_err(|e| e.traced(&trace))?;

    let (owner, capability) = state
        .sessions
        .signing_capability()
        .await
        .ok_or_else(|| {
            AppError::not_connected("connect a wallet before creating a campaign").traced(&trace)
        })?;

    let params = CreateCampaignParams {
        title: req.title,
        description: req.description,
        target_eth: req.target,
        deadline_ms: req.deadline,
        image: req.image,
    };

    let outcome = state
        .gateway
        .create_campaign(&capability, &owner, params)
        .await
        .map_err(|err| {
            metrics::count_err("campaign_create");
            classify_chain_error(&err).traced(&trace)
        })?;
    metrics::count_ok("campaign_create");
    success_response(outcome)
}

/// POST /api/campaigns/:id/donate
///
/// 向活动捐款，金额随交易 value 转出，等待一次确认
#[utoipa::path(
    post,
    path = "/api/campaigns/{id}/donate",
    params(("id" = u64, Path, description = "Campaign id (on-chain index)")),
    request_body = DonateReq,
    responses(
        (status = 200, description = "Donation confirmed", body = ApiResponse<TxOutcome>),
        (status = 400, description = "Invalid amount, insufficient funds, or contract revert"),
        (status = 409, description = "No wallet session"),
        (status = 502, description = "RPC endpoint unreachable")
    ),
    tag = "Campaigns"
)]
pub async fn donate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    trace: Option<Extension<String>>,
    Json(req): Json<DonateReq>,
) -> Result<Json<ApiResponse<TxOutcome>>, AppError> {
    let amount = req.amount.trim();
    if amount.is_empty() || amount.parse::<f64>().map(|v| v <= 0.0).unwrap_or(true) {
        return Err(
            AppError::bad_request("amount must be a positive ether value").traced(&trace),
        );
    }

    let (_, capability) = state
        .sessions
        .signing_capability()
        .await
        .ok_or_else(|| AppError::not_connected("connect a wallet before donating").traced(&trace))?;

    let outcome = state
        .gateway
        .donate(&capability, id, amount)
        .await
        .map_err(|err| {
            metrics::count_err("campaign_donate");
            classify_chain_error(&err).traced(&trace)
        })?;
    metrics::count_ok("campaign_donate");
    success_response(outcome)
}

/// GET /api/history/:address
///
/// 汇总某地址的参与历史：发起过的活动 + 捐赠过的活动及累计金额
#[utoipa::path(
    get,
    path = "/api/history/{address}",
    params(("address" = String, Path, description = "EVM address (checksum or lowercase)")),
    responses(
        (status = 200, description = "Participation history for the address", body = ApiResponse<UserHistory>),
        (status = 400, description = "Malformed address")
    ),
    tag = "Campaigns"
)]
pub async fn user_history(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    trace: Option<Extension<String>>,
) -> Result<Json<ApiResponse<UserHistory>>, AppError> {
    if !validate_evm_address(&address).unwrap_or(false) {
        metrics::count_err("history");
        return Err(
            AppError::invalid_address(format!("malformed EVM address: {address}")).traced(&trace),
        );
    }

    let connected = state.sessions.snapshot().await.address.is_some();
    let campaigns = state.gateway.list_campaigns(connected).await;

    let mut donations_per_campaign = Vec::with_capacity(campaigns.len());
    for campaign in &campaigns {
        donations_per_campaign.push(
            state
                .gateway
                .list_donators(campaign.p_id as u64, connected)
                .await,
        );
    }

    let history = rollup_user_history(&campaigns, &donations_per_campaign, &address);
    metrics::count_ok("history");
    success_response(history)
}

fn validate_create_req(req: &CreateCampaignReq) -> Result<(), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    let target = req.target.trim();
    if target.is_empty() || target.parse::<f64>().map(|v| v <= 0.0).unwrap_or(true) {
        return Err(AppError::bad_request("target must be a positive ether value"));
    }
    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    if req.deadline <= now_ms {
        return Err(AppError::bad_request("deadline must be in the future"));
    }
    Ok(())
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/:id/donations", get(list_donations))
        .route("/campaigns/:id/donate", post(donate))
        .route("/history/:address", get(user_history))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(title: &str, target: &str, deadline: u64) -> CreateCampaignReq {
        CreateCampaignReq {
            title: title.to_string(),
            description: "d".to_string(),
            target: target.to_string(),
            deadline,
            image: String::new(),
        }
    }

    #[test]
    fn test_create_req_validation() {
        let future = chrono::Utc::now().timestamp_millis() as u64 + 86_400_000;
        assert!(validate_create_req(&req("t", "1.5", future)).is_ok());
        assert!(validate_create_req(&req("", "1.5", future)).is_err());
        assert!(validate_create_req(&req("t", "0", future)).is_err());
        assert!(validate_create_req(&req("t", "abc", future)).is_err());
        // 截止时间必须在未来
        assert!(validate_create_req(&req("t", "1.5", 0)).is_err());
    }
}
