use std::sync::Arc;

use crate::{
    config::Config,
    service::{ContractGateway, SessionManager},
};

/// 应用状态
/// 包含所有共享资源
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<ContractGateway>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let sessions = Arc::new(SessionManager::new(
            config.network.clone(),
            config.accounts.clone(),
        ));
        let gateway = Arc::new(ContractGateway::new(config.network.clone())?);
        Ok(Self {
            config: Arc::new(config),
            sessions,
            gateway,
        })
    }
}
