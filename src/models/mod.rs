//! 数据模型模块
//! 后端统一响应包装，以及认证、考勤、个人资料模型

pub mod attendance;
pub mod auth;
pub mod profile;

use serde::Deserialize;

/// 后端统一响应包装 `{success, message, data, meta?}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: T,
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

/// 分页元信息（由服务端计算）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}
