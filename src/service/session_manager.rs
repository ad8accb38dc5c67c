//! 会话管理服务
//!
//! 持有进程内唯一的活跃钱包会话并负责全部状态迁移：
//! Disconnected → Connected 通过 connect_via_extension / connect_via_key /
//! select_account；Connected → Disconnected 通过 disconnect 或钱包侧的
//! 空账户事件；Connected → Connected（换地址）通过账户变更。
//! 会话作为显式值放在 RwLock 里，签名能力只随会话传递，不设全局单例。

use std::sync::{Arc, Mutex as StdMutex};

use ethers::{
    core::types::Address,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    utils::{format_ether, to_checksum},
};
use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, task::JoinHandle};
use utoipa::ToSchema;

use crate::{
    config::{AccountsConfig, NetworkConfig},
    domain::session::{ConnectionKind, Session, SessionSnapshot, SigningCapability},
    error::AppError,
    service::wallet_provider::WalletProvider,
    utils::normalize_private_key,
};

/// 本地测试账户记录
///
/// 从配置的固定私钥列表解析得到，有序；运行期不新增。
#[derive(Clone)]
struct AccountRecord {
    index: usize,
    address: String,
    balance: String,
    wallet: LocalWallet,
}

/// 账户记录的可序列化快照
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountSnapshot {
    pub index: usize,
    pub address: String,
    pub balance: String,
}

pub struct SessionManager {
    network: NetworkConfig,
    accounts_config: AccountsConfig,
    session: RwLock<Session>,
    accounts: RwLock<Vec<AccountRecord>>,
    /// 账户变更监听任务（每个扩展连接恰好一个，断开时销毁）
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(network: NetworkConfig, accounts_config: AccountsConfig) -> Self {
        Self {
            network,
            accounts_config,
            session: RwLock::new(Session::disconnected()),
            accounts: RwLock::new(Vec::new()),
            listener: StdMutex::new(None),
        }
    }

    /// 当前会话快照
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.read().await.snapshot()
    }

    /// 取活跃会话的地址和签名能力；无签名能力时返回 None
    ///
    /// 变更操作必须先经过这里，保证 kind=None 的会话在进入
    /// Contract Gateway 之前就被拒绝。
    pub async fn signing_capability(&self) -> Option<(String, SigningCapability)> {
        let session = self.session.read().await;
        session
            .capability
            .clone()
            .map(|cap| (session.address.clone(), cap))
    }

    /// 通过浏览器注入钱包连接
    ///
    /// 请求账户授权，建立 InjectedExtension 会话，并注册一次账户变更
    /// 订阅：变更时重跑连接流程，空账户列表触发断开。没有注入钱包时
    /// 错误非致命，原样返回给调用方。
    pub async fn connect_via_extension(
        self: &Arc<Self>,
        provider: Arc<dyn WalletProvider>,
    ) -> Result<SessionSnapshot, AppError> {
        let accounts = provider.request_accounts().await.map_err(|e| {
            AppError::transport_failure(format!("wallet did not grant account access: {:#}", e))
        })?;

        if accounts.is_empty() {
            return Err(AppError::not_connected("wallet returned no accounts"));
        }

        let snapshot = self
            .establish_extension_session(&provider, accounts)
            .await?;

        // 每个扩展连接只订阅一次；重复 connect 先撤掉旧监听
        let mut rx = provider.subscribe_account_changes();
        let mgr = Arc::clone(self);
        let provider_for_task = provider.clone();
        let handle = tokio::spawn(async move {
            while let Some(accounts) = rx.recv().await {
                if accounts.is_empty() {
                    tracing::info!("wallet reported empty account list, disconnecting");
                    mgr.disconnect().await;
                    break;
                }
                match mgr
                    .establish_extension_session(&provider_for_task, accounts)
                    .await
                {
                    Ok(snap) => {
                        tracing::info!(address = ?snap.address, "wallet account change applied")
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "wallet account change reconnect failed")
                    }
                }
            }
        });
        self.replace_listener(Some(handle));

        Ok(snapshot)
    }

    /// 扩展连接的会话建立（不含订阅）；账户变更时直接重跑这一段
    async fn establish_extension_session(
        &self,
        provider: &Arc<dyn WalletProvider>,
        accounts: Vec<String>,
    ) -> Result<SessionSnapshot, AppError> {
        let address = accounts
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_connected("wallet returned no accounts"))?;

        let balance = match provider.fetch_balance(&address).await {
            Ok(wei) => format_ether(wei),
            Err(err) => {
                tracing::warn!(error = %format!("{:#}", err), address = %address,
                    "balance fetch failed, defaulting to 0.0");
                "0.0".to_string()
            }
        };

        let mut session = self.session.write().await;
        *session = Session {
            address: address.clone(),
            connection_kind: ConnectionKind::InjectedExtension,
            cached_balance: balance,
            capability: Some(SigningCapability::Injected(provider.clone())),
        };
        tracing::info!(address = %address, kind = "injected-extension", "session established");
        Ok(session.snapshot())
    }

    /// 通过裸私钥连接
    ///
    /// 私钥编码规范化后对着配置端点派生签名中间件。端点未配置或仍是
    /// 占位符时失败；余额读取失败降级为 "0.0"。
    pub async fn connect_via_key(&self, raw_key: &str) -> Result<SessionSnapshot, AppError> {
        if !self.network.endpoint_configured() {
            return Err(AppError::configuration_missing(
                "RPC_URL is not set (or still a placeholder); cannot derive a signer",
            ));
        }

        let key = normalize_private_key(raw_key)
            .map_err(|e| AppError::invalid_key_material(format!("{:#}", e)))?;

        let wallet: LocalWallet = key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| AppError::invalid_key_material(format!("invalid private key: {}", e)))?;
        let wallet = wallet.with_chain_id(self.network.chain_id);

        let provider = Provider::<Http>::try_from(self.network.rpc_url.as_str())
            .map_err(|e| AppError::transport_failure(format!("bad RPC URL: {}", e)))?;

        let address = to_checksum(&wallet.address(), None);
        let balance = read_balance(&provider, wallet.address()).await;
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        // 离开扩展会话：撤掉账户变更监听，迟到的钱包事件不得再碰会话
        self.replace_listener(None);

        let mut session = self.session.write().await;
        *session = Session {
            address: address.clone(),
            connection_kind: ConnectionKind::RawKey,
            cached_balance: balance,
            capability: Some(SigningCapability::RawKey(client)),
        };
        tracing::info!(address = %address, kind = "raw-key", "session established");
        Ok(session.snapshot())
    }

    /// 解析配置的测试私钥列表为账户目录（地址 + 当前余额）
    ///
    /// 用于快速切换账户的开发流程，与单私钥连接路径互不影响。
    /// 余额读取失败降级为 "0.0"。
    pub async fn list_local_accounts(&self) -> Result<Vec<AccountSnapshot>, AppError> {
        if self.accounts_config.test_private_keys.is_empty() {
            return Ok(Vec::new());
        }
        if !self.network.endpoint_configured() {
            return Err(AppError::configuration_missing(
                "RPC_URL is not set; cannot resolve local test accounts",
            ));
        }

        let provider = Provider::<Http>::try_from(self.network.rpc_url.as_str())
            .map_err(|e| AppError::transport_failure(format!("bad RPC URL: {}", e)))?;

        let mut records = Vec::with_capacity(self.accounts_config.test_private_keys.len());
        for (index, raw_key) in self.accounts_config.test_private_keys.iter().enumerate() {
            let key = normalize_private_key(raw_key).map_err(|e| {
                AppError::invalid_key_material(format!("test key #{}: {:#}", index, e))
            })?;
            let wallet: LocalWallet = key.trim_start_matches("0x").parse().map_err(|e| {
                AppError::invalid_key_material(format!("test key #{}: {}", index, e))
            })?;
            let wallet = wallet.with_chain_id(self.network.chain_id);

            let address = to_checksum(&wallet.address(), None);
            let balance = read_balance(&provider, wallet.address()).await;

            records.push(AccountRecord {
                index,
                address,
                balance,
                wallet,
            });
        }

        let snapshots = records
            .iter()
            .map(|r| AccountSnapshot {
                index: r.index,
                address: r.address.clone(),
                balance: r.balance.clone(),
            })
            .collect();

        *self.accounts.write().await = records;
        tracing::info!(count = self.accounts_config.test_private_keys.len(),
            "local test accounts resolved");
        Ok(snapshots)
    }

    /// 把账户目录中的一条提升为活跃会话
    ///
    /// 越界返回 invalid_selection，当前会话保持不变。
    pub async fn select_account(&self, index: usize) -> Result<SessionSnapshot, AppError> {
        let record = {
            let accounts = self.accounts.read().await;
            let len = accounts.len();
            accounts.get(index).cloned().ok_or_else(|| {
                AppError::invalid_selection(format!(
                    "account index {} out of range ({} accounts loaded)",
                    index, len
                ))
            })?
        };

        let provider = Provider::<Http>::try_from(self.network.rpc_url.as_str())
            .map_err(|e| AppError::transport_failure(format!("bad RPC URL: {}", e)))?;
        let client = Arc::new(SignerMiddleware::new(provider, record.wallet.clone()));

        // 同 connect_via_key：从扩展会话切换过来时销毁旧监听
        self.replace_listener(None);

        let mut session = self.session.write().await;
        *session = Session {
            address: record.address.clone(),
            connection_kind: ConnectionKind::RawKey,
            cached_balance: record.balance.clone(),
            capability: Some(SigningCapability::RawKey(client)),
        };
        tracing::info!(address = %record.address, index = index, "account selected");
        Ok(session.snapshot())
    }

    /// 断开会话；幂等
    pub async fn disconnect(&self) {
        {
            let mut session = self.session.write().await;
            *session = Session::disconnected();
        }
        self.replace_listener(None);
        tracing::info!("session disconnected");
    }

    /// 重读活跃地址的余额；未连接时为 no-op
    pub async fn refresh_balance(&self) -> Result<SessionSnapshot, AppError> {
        let (address, capability) = {
            let session = self.session.read().await;
            if !session.is_connected() {
                return Ok(session.snapshot());
            }
            (session.address.clone(), session.capability.clone())
        };

        let balance = match capability {
            Some(SigningCapability::RawKey(client)) => {
                let addr: Address = address.parse().map_err(|_| {
                    AppError::invalid_address(format!("session address unparseable: {}", address))
                })?;
                let wei = client.get_balance(addr, None).await.map_err(|e| {
                    AppError::transport_failure(format!("balance query failed: {}", e))
                })?;
                format_ether(wei)
            }
            Some(SigningCapability::Injected(provider)) => {
                let wei = provider.fetch_balance(&address).await.map_err(|e| {
                    AppError::transport_failure(format!("balance query failed: {:#}", e))
                })?;
                format_ether(wei)
            }
            // is_connected 已保证有签名能力，这里兜底
            None => "0.0".to_string(),
        };

        let mut session = self.session.write().await;
        session.cached_balance = balance;
        Ok(session.snapshot())
    }

    fn replace_listener(&self, handle: Option<JoinHandle<()>>) {
        let mut slot = match self.listener.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = handle;
    }
}

/// 余额读取，失败降级为 "0.0"（非致命）
async fn read_balance(provider: &Provider<Http>, address: Address) -> String {
    match provider.get_balance(address, None).await {
        Ok(wei) => format_ether(wei),
        Err(err) => {
            tracing::warn!(error = %err, address = %to_checksum(&address, None),
                "balance fetch failed, defaulting to 0.0");
            "0.0".to_string()
        }
    }
}
