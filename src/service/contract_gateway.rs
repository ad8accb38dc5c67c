//! 合约网关服务
//!
//! 包装外部众筹合约的 ABI，暴露类型化的读写操作。合约本身（记账、
//! 转账、捐赠台账）不在本仓库，这里只做调用封装和单位换算：
//! 所有金额在边界上以 ether 十进制字符串出入，链上以 wei 整数表示，
//! parse_ether / format_ether 保证双向换算对称。
//!
//! 读操作本地降级（失败记日志返回空结果），写操作把底层错误原样上抛，
//! 由 API 层用 classify_chain_error 分类。

use std::sync::Arc;

use anyhow::{Context, Result};
use ethers::{
    contract::abigen,
    core::types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, U256,
    },
    providers::{Http, PendingTransaction, Provider},
    utils::{format_ether, parse_ether, to_checksum},
};

use crate::{
    config::{is_placeholder, NetworkConfig},
    domain::{
        campaign::{Campaign, Donation, TxOutcome},
        session::SigningCapability,
    },
    metrics,
    service::wallet_provider::WalletProvider,
};

// 外部合约的可调用面（协作方，地址与 ABI 来自静态配置）。
// getCampaigns 的返回元组声明为具名 struct，abigen 才会生成可解码的
// Vec<ChainCampaign> 绑定。
abigen!(
    CrowdFunding,
    r#"[
        struct ChainCampaign { address owner; string title; string description; uint256 target; uint256 deadline; uint256 amountCollected; string image; address[] donators; uint256[] donations; }
        function createCampaign(address _owner, string _title, string _description, uint256 _target, uint256 _deadline, string _image) returns (uint256)
        function donateToCampaign(uint256 _id) payable
        function getCampaigns() view returns (ChainCampaign[])
        function getDonators(uint256 _id) view returns (address[], uint256[])
    ]"#
);

/// 相邻两笔捐赠的估算间隔（毫秒）
const DONATION_SPACING_MS: u64 = 3_600_000;

/// createCampaign 的入参（owner 由活跃会话提供，不在这里）
#[derive(Debug, Clone)]
pub struct CreateCampaignParams {
    pub title: String,
    pub description: String,
    /// 目标金额（ether 十进制字符串）
    pub target_eth: String,
    /// 截止时间（epoch 毫秒）
    pub deadline_ms: u64,
    pub image: String,
}

pub struct ContractGateway {
    network: NetworkConfig,
    contract_address: Address,
}

impl ContractGateway {
    pub fn new(network: NetworkConfig) -> Result<Self> {
        let contract_address: Address = network
            .contract_address
            .parse()
            .context("CONTRACT_ADDRESS is not a valid EVM address")?;
        Ok(Self {
            network,
            contract_address,
        })
    }

    /// 读取全部众筹活动
    ///
    /// 有会话时走配置端点，没有会话时退回只读端点，保证未连接钱包也能
    /// 浏览。任何传输/解码失败都降级为空列表（非致命）。
    pub async fn list_campaigns(&self, connected: bool) -> Vec<Campaign> {
        match self.fetch_campaigns(connected).await {
            Ok(campaigns) => {
                metrics::inc_chain_read_ok();
                tracing::debug!(count = campaigns.len(), "campaigns fetched");
                campaigns
            }
            Err(err) => {
                metrics::inc_chain_read_err();
                tracing::error!(error = %format!("{:#}", err), "getCampaigns failed, returning empty list");
                Vec::new()
            }
        }
    }

    async fn fetch_campaigns(&self, connected: bool) -> Result<Vec<Campaign>> {
        let provider = self.read_provider(connected)?;
        let contract = CrowdFunding::new(self.contract_address, Arc::new(provider));

        let raw = contract
            .get_campaigns()
            .call()
            .await
            .context("getCampaigns call failed")?;

        Ok(raw
            .into_iter()
            .enumerate()
            .map(
                |(
                    p_id,
                    (
                        owner,
                        title,
                        description,
                        target,
                        deadline,
                        amount_collected,
                        image,
                        donators,
                        donations,
                    ),
                )| {
                    campaign_from_chain(
                        p_id,
                        ChainCampaign {
                            owner,
                            title,
                            description,
                            target,
                            deadline,
                            amount_collected,
                            image,
                            donators,
                            donations,
                        },
                    )
                },
            )
            .collect())
    }

    /// 读取某活动的捐赠记录
    ///
    /// 合约返回地址和金额两个平行数组，这里拼成 Donation；时间戳是
    /// 客户端估算值（见 Donation 文档），序号从 1 起。失败降级为空。
    pub async fn list_donators(&self, campaign_id: u64, connected: bool) -> Vec<Donation> {
        match self.fetch_donators(campaign_id, connected).await {
            Ok(donations) => {
                metrics::inc_chain_read_ok();
                donations
            }
            Err(err) => {
                metrics::inc_chain_read_err();
                tracing::error!(error = %format!("{:#}", err), campaign_id,
                    "getDonators failed, returning empty list");
                Vec::new()
            }
        }
    }

    async fn fetch_donators(&self, campaign_id: u64, connected: bool) -> Result<Vec<Donation>> {
        let provider = self.read_provider(connected)?;
        let contract = CrowdFunding::new(self.contract_address, Arc::new(provider));

        let (donators, amounts) = contract
            .get_donators(U256::from(campaign_id))
            .call()
            .await
            .context("getDonators call failed")?;

        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let timestamps = estimated_timestamps(amounts.len(), now_ms);

        Ok(donators
            .into_iter()
            .zip(amounts)
            .zip(timestamps)
            .enumerate()
            .map(|(i, ((donator, amount), timestamp))| Donation {
                donator: to_checksum(&donator, None),
                amount: format_ether(amount),
                timestamp,
                index: i + 1,
            })
            .collect())
    }

    /// 创建众筹活动（变更操作，要求签名能力，等待一次确认）
    pub async fn create_campaign(
        &self,
        capability: &SigningCapability,
        owner: &str,
        params: CreateCampaignParams,
    ) -> Result<TxOutcome> {
        let result = self.submit_create_campaign(capability, owner, params).await;
        match &result {
            Ok(outcome) => {
                metrics::inc_chain_write_ok();
                tracing::info!(tx_hash = %outcome.tx_hash, "campaign created");
            }
            Err(err) => {
                metrics::inc_chain_write_err();
                tracing::warn!(error = %format!("{:#}", err), "createCampaign failed");
            }
        }
        result
    }

    async fn submit_create_campaign(
        &self,
        capability: &SigningCapability,
        owner: &str,
        params: CreateCampaignParams,
    ) -> Result<TxOutcome> {
        let owner_addr: Address = owner.parse().context("owner is not a valid EVM address")?;
        let target_wei =
            parse_ether(params.target_eth.as_str()).context("target is not a valid ether amount")?;

        let receipt = match capability {
            SigningCapability::RawKey(client) => {
                let contract = CrowdFunding::new(self.contract_address, client.clone());
                let call = contract.create_campaign(
                    owner_addr,
                    params.title,
                    params.description,
                    target_wei,
                    U256::from(params.deadline_ms),
                    params.image,
                );
                let pending = call
                    .send()
                    .await
                    .context("failed to submit createCampaign")?;
                pending
                    .await
                    .context("confirmation wait failed")?
                    .context("transaction dropped before confirmation")?
            }
            SigningCapability::Injected(wallet) => {
                let provider = self.read_provider(true)?;
                let contract = CrowdFunding::new(self.contract_address, Arc::new(provider.clone()));
                let calldata = contract
                    .create_campaign(
                        owner_addr,
                        params.title,
                        params.description,
                        target_wei,
                        U256::from(params.deadline_ms),
                        params.image,
                    )
                    .calldata()
                    .context("failed to encode createCampaign calldata")?;
                self.send_via_wallet(&provider, wallet, calldata, None)
                    .await?
            }
        };

        Ok(self.outcome_from_receipt(receipt))
    }

    /// 向活动捐款（金额作为交易 value 附带）
    pub async fn donate(
        &self,
        capability: &SigningCapability,
        campaign_id: u64,
        amount_eth: &str,
    ) -> Result<TxOutcome> {
        let result = self.submit_donate(capability, campaign_id, amount_eth).await;
        match &result {
            Ok(outcome) => {
                metrics::inc_chain_write_ok();
                tracing::info!(tx_hash = %outcome.tx_hash, campaign_id, "donation confirmed");
            }
            Err(err) => {
                metrics::inc_chain_write_err();
                tracing::warn!(error = %format!("{:#}", err), campaign_id, "donateToCampaign failed");
            }
        }
        result
    }

    async fn submit_donate(
        &self,
        capability: &SigningCapability,
        campaign_id: u64,
        amount_eth: &str,
    ) -> Result<TxOutcome> {
        let amount_wei = parse_ether(amount_eth).context("amount is not a valid ether amount")?;

        let receipt = match capability {
            SigningCapability::RawKey(client) => {
                let contract = CrowdFunding::new(self.contract_address, client.clone());
                let call = contract
                    .donate_to_campaign(U256::from(campaign_id))
                    .value(amount_wei);
                let pending = call
                    .send()
                    .await
                    .context("failed to submit donateToCampaign")?;
                pending
                    .await
                    .context("confirmation wait failed")?
                    .context("transaction dropped before confirmation")?
            }
            SigningCapability::Injected(wallet) => {
                let provider = self.read_provider(true)?;
                let contract = CrowdFunding::new(self.contract_address, Arc::new(provider.clone()));
                let calldata = contract
                    .donate_to_campaign(U256::from(campaign_id))
                    .calldata()
                    .context("failed to encode donateToCampaign calldata")?;
                self.send_via_wallet(&provider, wallet, calldata, Some(amount_wei))
                    .await?
            }
        };

        Ok(self.outcome_from_receipt(receipt))
    }

    /// 注入钱包路径：钱包签名广播，本端对只读 provider 轮询回执
    async fn send_via_wallet(
        &self,
        provider: &Provider<Http>,
        wallet: &Arc<dyn WalletProvider>,
        calldata: Bytes,
        value: Option<U256>,
    ) -> Result<TransactionReceipt> {
        let mut tx = TypedTransaction::default();
        tx.set_to(self.contract_address);
        tx.set_data(calldata);
        tx.set_chain_id(self.network.chain_id);
        if let Some(value) = value {
            tx.set_value(value);
        }

        let tx_hash = wallet
            .sign_and_send(tx)
            .await
            .context("wallet rejected or failed to send transaction")?;

        PendingTransaction::new(tx_hash, provider)
            .await
            .context("confirmation wait failed")?
            .context("transaction dropped before confirmation")
    }

    /// 选择读端点：有会话用配置端点，无会话退回只读端点
    fn read_provider(&self, connected: bool) -> Result<Provider<Http>> {
        let url = if connected || self.network.read_only_rpc_url.is_empty() {
            &self.network.rpc_url
        } else {
            &self.network.read_only_rpc_url
        };
        if url.is_empty() || is_placeholder(url) {
            anyhow::bail!("no usable RPC endpoint configured");
        }
        Provider::<Http>::try_from(url.as_str()).context("bad RPC URL")
    }

    fn outcome_from_receipt(&self, receipt: TransactionReceipt) -> TxOutcome {
        let tx_hash = format!("{:?}", receipt.transaction_hash);
        TxOutcome {
            explorer_url: self.network.explorer_link(&tx_hash),
            tx_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()),
        }
    }
}

/// 链上元组 → 领域模型：金额换算到 ether 字符串，owner 规范化为校验和形式
fn campaign_from_chain(p_id: usize, raw: ChainCampaign) -> Campaign {
    Campaign {
        owner: to_checksum(&raw.owner, None),
        title: raw.title,
        description: raw.description,
        target: format_ether(raw.target),
        deadline: u256_to_u64_saturating(raw.deadline),
        amount_collected: format_ether(raw.amount_collected),
        image: raw.image,
        p_id,
    }
}

fn u256_to_u64_saturating(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.as_u64()
    }
}

/// 捐赠时间戳估算：从当前时刻起每笔向前推一小时
///
/// 最早一笔最旧，最后一笔即"现在"。纯函数，便于测试。
fn estimated_timestamps(count: usize, now_ms: u64) -> Vec<u64> {
    (0..count)
        .map(|i| now_ms.saturating_sub(((count - 1 - i) as u64) * DONATION_SPACING_MS))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn gateway_with(rpc_url: &str) -> Result<ContractGateway> {
        let mut config = Config::from_env().unwrap();
        config.network.rpc_url = rpc_url.to_string();
        config.network.read_only_rpc_url = rpc_url.to_string();
        config.network.contract_address =
            "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string();
        ContractGateway::new(config.network)
    }

    #[test]
    fn test_gateway_rejects_bad_contract_address() {
        let mut config = Config::from_env().unwrap();
        config.network.contract_address = "not-hex".to_string();
        assert!(ContractGateway::new(config.network).is_err());
    }

    #[test]
    fn test_estimated_timestamps_spacing() {
        let now = 10 * DONATION_SPACING_MS;
        let ts = estimated_timestamps(3, now);
        assert_eq!(ts.len(), 3);
        // 最后一笔就是"现在"，往前每笔一小时
        assert_eq!(ts[2], now);
        assert_eq!(ts[1], now - DONATION_SPACING_MS);
        assert_eq!(ts[0], now - 2 * DONATION_SPACING_MS);
    }

    #[test]
    fn test_estimated_timestamps_empty_and_saturating() {
        assert!(estimated_timestamps(0, 12345).is_empty());
        // now 太小时不回绕
        let ts = estimated_timestamps(3, 1);
        assert_eq!(ts[0], 0);
        assert_eq!(ts[2], 1);
    }

    #[test]
    fn test_campaign_projection_from_chain_record() {
        let raw = ChainCampaign {
            owner: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
                .parse()
                .unwrap(),
            title: "clean water".to_string(),
            description: "wells".to_string(),
            target: parse_ether("10").unwrap(),
            deadline: U256::from(1_700_000_000_000u64),
            amount_collected: parse_ether("2.5").unwrap(),
            image: String::new(),
            donators: vec![],
            donations: vec![],
        };

        let campaign = campaign_from_chain(3, raw);
        assert_eq!(campaign.p_id, 3);
        // owner 输出为 EIP-55 校验和形式
        assert_eq!(campaign.owner, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert!(campaign.target.starts_with("10"));
        assert!(campaign.amount_collected.starts_with("2.5"));
        assert_eq!(campaign.deadline, 1_700_000_000_000);
    }

    #[test]
    fn test_u256_saturation() {
        assert_eq!(u256_to_u64_saturating(U256::from(42u64)), 42);
        assert_eq!(u256_to_u64_saturating(U256::MAX), u64::MAX);
    }

    #[test]
    fn test_ether_conversion_is_symmetric() {
        // 人类十进制 ⇄ wei 的换算必须对称
        let wei = parse_ether("2.5").unwrap();
        assert_eq!(wei, U256::from(2_500_000_000_000_000_000u64));
        let back = format_ether(wei);
        assert_eq!(back.trim_end_matches('0').trim_end_matches('.'), "2.5".trim_end_matches('0').trim_end_matches('.'));
    }

    #[tokio::test]
    async fn test_list_campaigns_degrades_to_empty_on_transport_failure() {
        // 不可达端点：读操作不上抛，降级为空列表
        let gateway = gateway_with("http://127.0.0.1:1").unwrap();
        let campaigns = gateway.list_campaigns(false).await;
        assert!(campaigns.is_empty());
    }

    #[tokio::test]
    async fn test_list_donators_degrades_to_empty_on_transport_failure() {
        let gateway = gateway_with("http://127.0.0.1:1").unwrap();
        let donations = gateway.list_donators(0, false).await;
        assert!(donations.is_empty());
    }
}
