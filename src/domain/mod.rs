//! Domain 模块
//!
//! 包含核心业务领域模型

pub mod campaign;
pub mod session;

// 重新导出常用类型
pub use campaign::{Campaign, Donation, TxOutcome};
pub use session::{ConnectionKind, Session, SessionSnapshot, SigningCapability};
