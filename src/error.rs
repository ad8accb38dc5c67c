use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 错误码
///
/// 读操作失败不会走到这里（本地降级为空结果）；写操作的底层错误由
/// [`classify_chain_error`] 分类后用这里的业务错误码上抛。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorCode {
    // HTTP 基础错误码
    BadRequest,
    Internal,

    // 业务错误码
    NotConnected,
    InvalidSelection,
    InsufficientFunds,
    TransportFailure,
    ContractRevert,
    ConfigurationMissing,
    InvalidKeyMaterial,
    InvalidAddress,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    trace_id: Option<&'a str>,
}

impl AppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::Internal => "internal",
            AppErrorCode::NotConnected => "not_connected",
            AppErrorCode::InvalidSelection => "invalid_selection",
            AppErrorCode::InsufficientFunds => "insufficient_funds",
            AppErrorCode::TransportFailure => "transport_failure",
            AppErrorCode::ContractRevert => "contract_revert",
            AppErrorCode::ConfigurationMissing => "configuration_missing",
            AppErrorCode::InvalidKeyMaterial => "invalid_key_material",
            AppErrorCode::InvalidAddress => "invalid_address",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.as_str(),
            message: &self.message,
            trace_id: self.trace_id.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::BadRequest,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::Internal,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    /// 设置追踪ID
    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// 附加请求扩展中的 trace_id（由中间件注入；缺失时原样返回）
    pub fn traced(self, trace: &Option<axum::Extension<String>>) -> Self {
        match trace {
            Some(axum::Extension(id)) => self.with_trace_id(id.clone()),
            None => self,
        }
    }

    // 业务错误辅助函数

    /// 无签名能力时发起变更操作
    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::NotConnected,
            message: msg.into(),
            status: StatusCode::CONFLICT,
            trace_id: None,
        }
    }

    /// 账户索引越界
    pub fn invalid_selection(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidSelection,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    /// 余额不足导致交易被拒（前端引导用户去领水/充值）
    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InsufficientFunds,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn transport_failure(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::TransportFailure,
            message: msg.into(),
            status: StatusCode::BAD_GATEWAY,
            trace_id: None,
        }
    }

    /// 链上回滚（余额原因之外的拒绝）
    pub fn contract_revert(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ContractRevert,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn configuration_missing(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ConfigurationMissing,
            message: msg.into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
            trace_id: None,
        }
    }

    pub fn invalid_key_material(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidKeyMaterial,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidAddress,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }
}

/// 将链交互的底层错误分类为业务错误码
///
/// 余额不足没有统一的错误码，各 provider 只保证消息里带有
/// "insufficient funds" 字样；回滚同理匹配 "revert"。匹配不到的一律
/// 归为传输失败，原始消息原样透传给前端展示。
pub fn classify_chain_error(err: &anyhow::Error) -> AppError {
    let text = format!("{:#}", err).to_lowercase();

    if text.contains("insufficient funds") || text.contains("insufficient balance") {
        return AppError::insufficient_funds(format!("{:#}", err));
    }
    if text.contains("revert") || text.contains("execution reverted") {
        return AppError::contract_revert(format!("{:#}", err));
    }
    AppError::transport_failure(format!("{:#}", err))
}

// 从 serde_json 错误转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON serialization error: {}", err))
    }
}

// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}
