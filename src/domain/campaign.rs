//! 众筹领域模型（合约状态的只读投影）
//!
//! 所有字段派生自合约读调用，本地从不修改；交易确认后由调用方重新读取。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 一条众筹活动记录
///
/// `p_id` 等于链上数组的读取顺序下标，单次读取内稳定。
/// 金额字段统一为 ether 十进制字符串（与链上 wei 对称换算，无额外取整）。
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Campaign {
    pub owner: String,
    pub title: String,
    pub description: String,
    /// 目标金额（ether 十进制字符串）
    pub target: String,
    /// 截止时间（epoch 毫秒）
    pub deadline: u64,
    /// 已筹金额（与 target 同单位）
    pub amount_collected: String,
    pub image: String,
    pub p_id: usize,
}

/// 单笔捐赠记录
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Donation {
    pub donator: String,
    /// 捐赠金额（ether 十进制字符串）
    pub amount: String,
    /// 估算时间戳（epoch 毫秒）
    ///
    /// 注意：合约不记录捐赠时间，这里按"距当前时刻每笔间隔一小时向前
    /// 推算"合成，仅用于展示排序，不可当作链上事实。
    pub timestamp: u64,
    /// 1 起始的序号
    pub index: usize,
}

/// 变更操作的确认结果
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TxOutcome {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    /// 区块浏览器深链
    pub explorer_url: String,
}
