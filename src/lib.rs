//! FundCore - 众筹 dApp 后端
//!
//! 非托管模式：会话中的签名能力要么来自外部钱包、要么来自显式配置的
//! 测试私钥，服务本身不落盘任何密钥材料。众筹记账完全在链上合约，
//! 这里只做会话管理、合约调用封装和展示数据聚合。

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{AppError, AppErrorCode};

pub mod prelude {
    pub use crate::{
        app_state::AppState,
        domain::{Campaign, ConnectionKind, Donation, SessionSnapshot, TxOutcome},
        error::{AppError, AppErrorCode},
        service::{ContractGateway, SessionManager, WalletProvider},
    };
}
