//! 钱包会话领域模型
//!
//! 全进程同一时刻只有一个活跃 Session，由 SessionManager 持有并负责
//! 状态迁移；这里只定义状态本身。
//! 状态机：Disconnected ⇄ Connected(kind)，Connected→Connected 为换账户。

use std::sync::Arc;

use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::LocalWallet,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::service::wallet_provider::WalletProvider;

/// 本地私钥会话使用的签名客户端
pub type RawKeyClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// 连接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    None,
    InjectedExtension,
    RawKey,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::None => "none",
            ConnectionKind::InjectedExtension => "injected-extension",
            ConnectionKind::RawKey => "raw-key",
        }
    }
}

/// 签名能力
///
/// 每个 Session 至多持有一份；kind=None 的会话没有签名能力，所有变更
/// 操作必须在进入 Contract Gateway 之前被拒绝。
#[derive(Clone)]
pub enum SigningCapability {
    /// 本地私钥 + 配置端点派生的签名中间件
    RawKey(Arc<RawKeyClient>),
    /// 浏览器注入钱包（签名委托给外部 provider）
    Injected(Arc<dyn WalletProvider>),
}

impl std::fmt::Debug for SigningCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningCapability::RawKey(_) => write!(f, "SigningCapability::RawKey"),
            SigningCapability::Injected(_) => write!(f, "SigningCapability::Injected"),
        }
    }
}

/// 活跃会话
#[derive(Debug, Clone)]
pub struct Session {
    pub address: String,
    pub connection_kind: ConnectionKind,
    /// 上次读取的余额（ether 十进制字符串）
    pub cached_balance: String,
    pub capability: Option<SigningCapability>,
}

impl Session {
    /// 空会话（断开状态）
    pub fn disconnected() -> Self {
        Self {
            address: String::new(),
            connection_kind: ConnectionKind::None,
            cached_balance: "0.0".to_string(),
            capability: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_kind != ConnectionKind::None
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            address: if self.address.is_empty() {
                None
            } else {
                Some(self.address.clone())
            },
            connection_kind: self.connection_kind,
            balance: self.cached_balance.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// 会话的可序列化快照（API 返回用，不携带签名能力）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSnapshot {
    pub address: Option<String>,
    pub connection_kind: ConnectionKind,
    pub balance: String,
}
