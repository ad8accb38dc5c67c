//! 注入钱包抽象
//!
//! 浏览器注入钱包（MetaMask 一类）是外部协作方：它提供账户授权、交易
//! 签名和账户变更推送。后端不持有它的私钥，只通过这个 trait 发指令。
//! 测试里用内存 mock 实现驱动会话状态机。

use anyhow::Result;
use async_trait::async_trait;
use ethers::core::types::{transaction::eip2718::TypedTransaction, H256, U256};
use tokio::sync::mpsc::UnboundedReceiver;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// 请求账户授权，返回授权的地址列表
    ///
    /// 空列表表示用户未授权任何账户；没有注入钱包时返回 Err。
    async fn request_accounts(&self) -> Result<Vec<String>>;

    /// 查询地址余额（wei）
    async fn fetch_balance(&self, address: &str) -> Result<U256>;

    /// 由钱包签名并广播交易，返回交易哈希
    ///
    /// 确认等待不在这里：提交后由 Contract Gateway 对着只读端点轮询回执。
    async fn sign_and_send(&self, tx: TypedTransaction) -> Result<H256>;

    /// 订阅账户变更通知
    ///
    /// 每次连接只订阅一次；空账户列表表示钱包侧断开。
    fn subscribe_account_changes(&self) -> UnboundedReceiver<Vec<String>>;
}
