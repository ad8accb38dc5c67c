//! 展示层聚合计算
//!
//! 由链上原始数据派生展示字段的纯函数：进度百分比、剩余天数、
//! 以及某地址的参与历史汇总。不做任何 IO，输入相同输出必然相同。

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{domain::campaign::Campaign, utils::addresses_equal};

/// 一天的毫秒数
const DAY_MS: u64 = 86_400_000;

/// 带派生字段的活动视图
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    /// 筹款进度百分比，[0, 100]
    pub progress_pct: f64,
    /// 距截止的整天数，已过期为 0
    pub days_remaining: u64,
}

/// 用户在某活动上的捐赠汇总
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonatedCampaign {
    #[serde(flatten)]
    pub campaign: Campaign,
    /// 该用户在此活动的累计捐赠（ether 十进制字符串）
    pub user_total: String,
}

/// 某地址的参与历史
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserHistory {
    /// 该地址发起的活动
    pub created: Vec<Campaign>,
    /// 该地址捐赠过的活动及累计金额
    pub donated: Vec<DonatedCampaign>,
}

/// 计算筹款进度百分比，钳制在 [0, 100]
///
/// 目标非正数时返回 0 而不是除零/无穷，保证渲染侧拿到的永远是
/// 合法百分比。
pub fn compute_progress(raised: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    ((raised / target) * 100.0).clamp(0.0, 100.0)
}

/// 计算距截止时间的剩余整天数（向上取整），已过期返回 0
pub fn compute_days_remaining(deadline_ms: u64, now_ms: u64) -> u64 {
    let remaining = deadline_ms.saturating_sub(now_ms);
    remaining.div_ceil(DAY_MS)
}

/// 为单个活动补齐派生字段
pub fn enrich_campaign(campaign: Campaign, now_ms: u64) -> CampaignView {
    let raised = campaign.amount_collected.parse::<f64>().unwrap_or(0.0);
    let target = campaign.target.parse::<f64>().unwrap_or(0.0);
    CampaignView {
        progress_pct: compute_progress(raised, target),
        days_remaining: compute_days_remaining(campaign.deadline, now_ms),
        campaign,
    }
}

/// 汇总某地址的参与历史
///
/// `donations_per_campaign` 与 `campaigns` 按下标对齐。地址比较不区分
/// 大小写（同一地址的校验和形式与全小写形式视为同一人）。
pub fn rollup_user_history(
    campaigns: &[Campaign],
    donations_per_campaign: &[Vec<crate::domain::campaign::Donation>],
    user: &str,
) -> UserHistory {
    let created = campaigns
        .iter()
        .filter(|c| addresses_equal(&c.owner, user))
        .cloned()
        .collect();

    let mut donated = Vec::new();
    for (campaign, donations) in campaigns.iter().zip(donations_per_campaign) {
        // 是否捐赠过按地址匹配判定，不按金额：零额捐赠同样算参与
        let user_donations: Vec<_> = donations
            .iter()
            .filter(|d| addresses_equal(&d.donator, user))
            .collect();
        if user_donations.is_empty() {
            continue;
        }
        let total: f64 = user_donations
            .iter()
            .filter_map(|d| d.amount.parse::<f64>().ok())
            .sum();
        donated.push(DonatedCampaign {
            campaign: campaign.clone(),
            user_total: format!("{total}"),
        });
    }

    UserHistory { created, donated }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::campaign::Donation;

    fn campaign(owner: &str, target: &str, collected: &str, deadline: u64, p_id: usize) -> Campaign {
        Campaign {
            owner: owner.to_string(),
            title: format!("campaign-{p_id}"),
            description: String::new(),
            target: target.to_string(),
            deadline,
            amount_collected: collected.to_string(),
            image: String::new(),
            p_id,
        }
    }

    #[test]
    fn test_progress_basic() {
        assert_eq!(compute_progress(2.5, 10.0), 25.0);
        assert_eq!(compute_progress(0.0, 10.0), 0.0);
        assert_eq!(compute_progress(10.0, 10.0), 100.0);
    }

    #[test]
    fn test_progress_clamped_and_degenerate_target() {
        // 超募钳到 100
        assert_eq!(compute_progress(20.0, 10.0), 100.0);
        // 目标非正数不产生除零
        assert_eq!(compute_progress(5.0, 0.0), 0.0);
        assert_eq!(compute_progress(5.0, -1.0), 0.0);
    }

    #[test]
    fn test_progress_monotone_in_raised() {
        let mut last = 0.0;
        for raised in [0.0, 1.0, 2.5, 7.0, 9.9, 10.0, 15.0] {
            let p = compute_progress(raised, 10.0);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn test_days_remaining() {
        let now = 1_000 * DAY_MS;
        assert_eq!(compute_days_remaining(now + 3 * DAY_MS, now), 3);
        // 不足一天向上取整
        assert_eq!(compute_days_remaining(now + 1, now), 1);
        // 已过期为 0，不为负
        assert_eq!(compute_days_remaining(now - DAY_MS, now), 0);
        assert_eq!(compute_days_remaining(now, now), 0);
    }

    #[test]
    fn test_enrich_campaign() {
        let now = 100 * DAY_MS;
        let view = enrich_campaign(campaign("0xabc", "10.0", "2.5", now + 2 * DAY_MS, 0), now);
        assert_eq!(view.progress_pct, 25.0);
        assert_eq!(view.days_remaining, 2);
    }

    #[test]
    fn test_rollup_user_history_case_insensitive() {
        let user = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let campaigns = vec![
            campaign(user, "10.0", "1.0", 0, 0),
            campaign("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "5.0", "2.0", 0, 1),
        ];
        let donations = vec![
            vec![],
            vec![
                Donation {
                    donator: user.to_lowercase(),
                    amount: "0.5".to_string(),
                    timestamp: 0,
                    index: 1,
                },
                Donation {
                    donator: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
                    amount: "1.5".to_string(),
                    timestamp: 0,
                    index: 2,
                },
                Donation {
                    donator: user.to_string(),
                    amount: "0.25".to_string(),
                    timestamp: 0,
                    index: 3,
                },
            ],
        ];

        let history = rollup_user_history(&campaigns, &donations, user);
        assert_eq!(history.created.len(), 1);
        assert_eq!(history.created[0].p_id, 0);
        assert_eq!(history.donated.len(), 1);
        assert_eq!(history.donated[0].campaign.p_id, 1);
        assert_eq!(history.donated[0].user_total, "0.75");
    }

    #[test]
    fn test_rollup_keeps_zero_amount_donation() {
        // 捐过 0 ether 也算参与过该活动
        let user = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let campaigns = vec![campaign("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "5.0", "0.0", 0, 0)];
        let donations = vec![vec![Donation {
            donator: user.to_string(),
            amount: "0".to_string(),
            timestamp: 0,
            index: 0,
        }]];

        let history = rollup_user_history(&campaigns, &donations, user);
        assert_eq!(history.donated.len(), 1);
        assert_eq!(history.donated[0].user_total, "0");
    }

    #[test]
    fn test_rollup_empty_inputs() {
        let history = rollup_user_history(&[], &[], "0xabc");
        assert!(history.created.is_empty());
        assert!(history.donated.is_empty());
    }
}
