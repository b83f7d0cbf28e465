//! 统一错误模型
//! 定义客户端所有错误类型，以及面向用户的错误消息

use thiserror::Error;

use crate::services::attendance_service::{AttendanceAction, AttendanceState};

/// 客户端错误类型
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// 401：令牌失效，已强制登出
    #[error("Session expired or invalid")]
    Auth,

    /// 缺少必填输入，不会发出网络请求
    #[error("Validation error: {0}")]
    Validation(String),

    /// 其它非 2xx 响应
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// 图床上传失败（中止整个资料保存）
    #[error("Upload failed: {0}")]
    Upload(String),

    /// 当前考勤状态不允许该操作，请求未发送
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: AttendanceState,
        action: AttendanceAction,
    },

    /// 已有考勤请求在进行中
    #[error("Another attendance request is already in progress")]
    TransitionInFlight,

    /// 令牌持久化失败
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Network error: {0}")]
    Network(String),

    /// 响应体无法解析
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// 客户端 Result 类型
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// 获取状态码（作为数字）
    pub fn status_code(&self) -> u16 {
        match self {
            ClientError::Auth => 401,
            ClientError::Validation(_) => 400,
            ClientError::Api { status, .. } => *status,
            ClientError::InvalidTransition { .. } => 409,
            ClientError::TransitionInFlight => 429,
            ClientError::Upload(_) | ClientError::Decode(_) => 502,
            ClientError::Network(_) => 503,
            ClientError::Persistence(_) | ClientError::Config(_) => 500,
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Auth => "Session expired, please log in again".to_string(),
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Api { message, .. } => message.clone(),
            ClientError::Upload(_) => "Failed to upload photo".to_string(),
            ClientError::InvalidTransition { state, action } => {
                format!("Cannot {} now: {}", action, state)
            }
            ClientError::TransitionInFlight => "Request is being processed".to_string(),
            ClientError::Persistence(_) => "Failed to store session".to_string(),
            ClientError::Network(_) => "Unable to reach the server".to_string(),
            ClientError::Decode(_) => "Unexpected response from the server".to_string(),
            ClientError::Config(_) => "Configuration error".to_string(),
        }
    }

    /// 是否允许透明重试一次（仅网络错误和 5xx）
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// 是否为强制登出类错误
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth)
    }

    // 便捷方法
    pub fn validation(msg: &str) -> Self {
        ClientError::Validation(msg.to_string())
    }

    pub fn persistence(msg: &str) -> Self {
        ClientError::Persistence(msg.to_string())
    }

    pub fn upload(msg: &str) -> Self {
        ClientError::Upload(msg.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(e: config::ConfigError) -> Self {
        ClientError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(e: validator::ValidationErrors) -> Self {
        // 只取第一条字段错误作为提示
        let message = e
            .field_errors()
            .into_iter()
            .flat_map(|(_, errors)| errors.iter())
            .find_map(|error| error.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Please fill in all fields".to_string());
        ClientError::Validation(message)
    }
}
