//! FundCore 主入口
//! 众筹 dApp 后端：钱包会话 + 合约网关 + 视图聚合

use std::sync::Arc;

use anyhow::{Context, Result};
use fundcore::{api, app_state::AppState, config::Config, infrastructure::logging};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 加载配置（CONFIG_PATH 指定文件时文件优先，环境变量兜底）
    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => Config::from_env_and_file(Some(path.as_str()))?,
        Err(_) => Config::from_env()?,
    };
    config.validate()?;

    // 3. 初始化日志，guard 持有到进程退出
    let _log_guard = logging::init_logging(&config.logging)?;

    tracing::info!("🚀 Starting FundCore crowdfunding backend");
    tracing::info!(
        chain_id = config.network.chain_id,
        contract = %config.network.contract_address,
        "network configured"
    );
    if !config.network.endpoint_configured() {
        tracing::warn!("⚠️ RPC endpoint not configured, chain reads will degrade to empty results");
    }

    // 4. 初始化应用状态
    let state = Arc::new(AppState::new(config.clone())?);

    // 5. 启动 HTTP 服务
    let app = api::routes(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    tracing::info!("✅ Listening on {}", config.server.bind_addr);
    tracing::info!("📖 Swagger UI at /swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}
