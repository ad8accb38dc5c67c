//! 会话状态机集成测试
//!
//! 用内存 mock 的注入钱包驱动完整的连接 / 账户变更 / 断开流程，
//! 不依赖任何网络或真实链。

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use ethers::core::types::{transaction::eip2718::TypedTransaction, H256, U256};
use fundcore::{
    config::{AccountsConfig, Config},
    domain::ConnectionKind,
    service::{SessionManager, WalletProvider},
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

const ADDR_A: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const ADDR_B: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

/// 内存 mock：固定账户列表 + 手动触发的账户变更通道
struct MockWallet {
    accounts: Mutex<Vec<String>>,
    events: Mutex<Option<UnboundedReceiver<Vec<String>>>>,
}

impl MockWallet {
    fn new(accounts: Vec<&str>) -> (Arc<Self>, UnboundedSender<Vec<String>>) {
        let (tx, rx) = unbounded_channel();
        let wallet = Arc::new(Self {
            accounts: Mutex::new(accounts.into_iter().map(str::to_string).collect()),
            events: Mutex::new(Some(rx)),
        });
        (wallet, tx)
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<String>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn fetch_balance(&self, _address: &str) -> Result<U256> {
        Ok(U256::from(1_000_000_000_000_000_000u64)) // 1 ether
    }

    async fn sign_and_send(&self, _tx: TypedTransaction) -> Result<H256> {
        Ok(H256::zero())
    }

    fn subscribe_account_changes(&self) -> UnboundedReceiver<Vec<String>> {
        self.events
            .lock()
            .unwrap()
            .take()
            .expect("subscribe called twice")
    }
}

// Hardhat 测试账户 #0（地址即 ADDR_A）
const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn manager_with_keys(keys: Vec<String>) -> Arc<SessionManager> {
    let mut config = Config::from_env().unwrap();
    // 不可达端点：余额查询快速失败并降级
    config.network.rpc_url = "http://127.0.0.1:1".to_string();
    Arc::new(SessionManager::new(
        config.network,
        AccountsConfig {
            test_private_keys: keys,
        },
    ))
}

fn manager() -> Arc<SessionManager> {
    manager_with_keys(vec![])
}

#[tokio::test]
async fn test_extension_connect_and_disconnect() {
    let mgr = manager();
    let (wallet, _tx) = MockWallet::new(vec![ADDR_A]);

    let snapshot = mgr.connect_via_extension(wallet).await.unwrap();
    assert_eq!(snapshot.address.as_deref(), Some(ADDR_A));
    assert_eq!(snapshot.connection_kind, ConnectionKind::InjectedExtension);

    mgr.disconnect().await;
    let snapshot = mgr.snapshot().await;
    assert!(snapshot.address.is_none());
    assert_eq!(snapshot.connection_kind, ConnectionKind::None);
}

#[tokio::test]
async fn test_extension_connect_rejected_when_no_accounts() {
    let mgr = manager();
    let (wallet, _tx) = MockWallet::new(vec![]);

    let err = mgr.connect_via_extension(wallet).await.unwrap_err();
    assert_eq!(err.code.as_str(), "not_connected");
    assert!(mgr.snapshot().await.address.is_none());
}

#[tokio::test]
async fn test_account_change_switches_session() {
    let mgr = manager();
    let (wallet, tx) = MockWallet::new(vec![ADDR_A]);

    mgr.connect_via_extension(wallet.clone()).await.unwrap();
    assert_eq!(mgr.snapshot().await.address.as_deref(), Some(ADDR_A));

    // 钱包侧切换账户：会话跟随新的首账户
    *wallet.accounts.lock().unwrap() = vec![ADDR_B.to_string()];
    tx.send(vec![ADDR_B.to_string()]).unwrap();

    // 监听任务异步处理事件，轮询等待状态收敛
    for _ in 0..50 {
        if mgr.snapshot().await.address.as_deref() == Some(ADDR_B) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let snapshot = mgr.snapshot().await;
    assert_eq!(snapshot.address.as_deref(), Some(ADDR_B));
    assert_eq!(snapshot.connection_kind, ConnectionKind::InjectedExtension);
}

#[tokio::test]
async fn test_empty_account_event_disconnects() {
    let mgr = manager();
    let (wallet, tx) = MockWallet::new(vec![ADDR_A]);

    mgr.connect_via_extension(wallet).await.unwrap();

    // 空账户列表 = 钱包侧断开
    tx.send(vec![]).unwrap();

    for _ in 0..50 {
        if mgr.snapshot().await.address.is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let snapshot = mgr.snapshot().await;
    assert!(snapshot.address.is_none());
    assert_eq!(snapshot.connection_kind, ConnectionKind::None);
}

#[tokio::test]
async fn test_key_connect_tears_down_extension_listener() {
    let mgr = manager();
    let (wallet, tx) = MockWallet::new(vec![ADDR_B]);
    mgr.connect_via_extension(wallet).await.unwrap();

    let snap = mgr.connect_via_key(TEST_KEY).await.unwrap();
    assert_eq!(snap.connection_kind, ConnectionKind::RawKey);
    assert_eq!(snap.address.as_deref(), Some(ADDR_A));

    // 旧订阅已销毁：迟到的钱包事件不得覆盖裸私钥会话
    let _ = tx.send(vec![ADDR_B.to_string()]);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let after = mgr.snapshot().await;
    assert_eq!(after.connection_kind, ConnectionKind::RawKey);
    assert_eq!(after.address.as_deref(), Some(ADDR_A));
}

#[tokio::test]
async fn test_select_account_tears_down_extension_listener() {
    let mgr = manager_with_keys(vec![TEST_KEY.to_string()]);
    let (wallet, tx) = MockWallet::new(vec![ADDR_B]);
    mgr.connect_via_extension(wallet).await.unwrap();

    mgr.list_local_accounts().await.unwrap();
    let snap = mgr.select_account(0).await.unwrap();
    assert_eq!(snap.connection_kind, ConnectionKind::RawKey);

    // 空账户事件原本会触发断开；旧订阅销毁后不得波及新会话
    let _ = tx.send(vec![]);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let after = mgr.snapshot().await;
    assert_eq!(after.connection_kind, ConnectionKind::RawKey);
    assert_eq!(after.address.as_deref(), Some(ADDR_A));
}

#[tokio::test]
async fn test_no_signing_capability_when_disconnected() {
    let mgr = manager();
    // 变更操作在进入网关前就应因缺少签名能力被拒绝
    assert!(mgr.signing_capability().await.is_none());

    let (wallet, _tx) = MockWallet::new(vec![ADDR_A]);
    mgr.connect_via_extension(wallet).await.unwrap();
    let (address, _capability) = mgr.signing_capability().await.unwrap();
    assert_eq!(address, ADDR_A);

    mgr.disconnect().await;
    assert!(mgr.signing_capability().await.is_none());
}
