//! API 网关
//!
//! 所有后端请求的唯一出口：注入令牌、编码 JSON、统一错误转换。
//! 401 在这里统一触发会话失效，调用方无需单独处理。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::auth::{Credentials, SessionStore};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::ApiEnvelope;

/// 服务端未提供消息时的默认提示
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// 幂等请求的最大尝试次数（含首次）
const MAX_READ_ATTEMPTS: u32 = 2;

/// API 网关
pub struct ApiGateway {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionStore>,
}

impl ApiGateway {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionStore>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            session,
        }
    }

    /// 使用 reqwest 传输层创建网关
    pub fn from_config(config: &ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::new(
            config.api.base_url.clone(),
            Arc::new(transport),
            session,
        ))
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiEnvelope<T>> {
        self.request(HttpMethod::Get, endpoint, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        let body = serde_json::to_value(body)?;
        self.request(HttpMethod::Post, endpoint, Some(body)).await
    }

    /// 无请求体的 POST（考勤打卡）
    pub async fn post_empty<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiEnvelope<T>> {
        self.request(HttpMethod::Post, endpoint, None).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        let body = serde_json::to_value(body)?;
        self.request(HttpMethod::Patch, endpoint, Some(body)).await
    }

    /// 发送请求并解析统一响应包装
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiEnvelope<T>> {
        // 凭据在请求发出时捕获，中途登出不影响已发出的请求
        let credentials = self.session.credentials().await;
        let url = format!("{}{}", self.base_url, endpoint);
        let max_attempts = if method.is_idempotent() {
            MAX_READ_ATTEMPTS
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = HttpRequest {
                method,
                url: url.clone(),
                bearer: credentials.token.clone(),
                request_id: Uuid::new_v4().to_string(),
                body: body.clone(),
            };
            let request_id = request.request_id.clone();

            let start = Instant::now();
            let outcome = self.transport.send(request).await;
            let elapsed = start.elapsed();

            let status = outcome.as_ref().map(|r| r.status).ok();
            record_metrics(method, status, elapsed.as_secs_f64());
            debug!(
                method = %method,
                endpoint = endpoint,
                request_id = %request_id,
                status = status,
                attempt = attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed"
            );

            let result = match outcome {
                Ok(response) => self.translate(response, &credentials).await,
                Err(e) => Err(e),
            };

            match result {
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(
                        method = %method,
                        endpoint = endpoint,
                        error = %e,
                        "Request failed, retrying once"
                    );
                }
                other => return other,
            }
        }
    }

    /// 将原始响应转换为结果
    async fn translate<T: DeserializeOwned>(
        &self,
        response: HttpResponse,
        credentials: &Credentials,
    ) -> Result<ApiEnvelope<T>> {
        if response.is_success() {
            return serde_json::from_slice(&response.body).map_err(ClientError::from);
        }

        let message =
            extract_message(&response.body).unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

        // 未携带令牌的 401（例如登录失败）没有会话可失效，按普通错误返回
        if response.status == 401 && credentials.token.is_some() {
            // 内存中的会话已清除，令牌文件清理失败不改变结果
            match self.session.expire(credentials.epoch).await {
                Ok(true) => info!("Forced logout after 401 response"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Forced logout but failed to clear stored token"),
            }
            return Err(ClientError::Auth);
        }

        Err(ClientError::Api {
            status: response.status,
            message,
        })
    }
}

impl std::fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// 提取服务端错误消息
fn extract_message(body: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    serde_json::from_slice::<ErrorBody>(body)
        .ok()?
        .message
        .filter(|m| !m.trim().is_empty())
}

/// 记录指标 - 使用静态字符串
fn record_metrics(method: HttpMethod, status: Option<u16>, elapsed_secs: f64) {
    let status_label = match status {
        Some(200) => "200",
        Some(201) => "201",
        Some(400) => "400",
        Some(401) => "401",
        Some(403) => "403",
        Some(404) => "404",
        Some(409) => "409",
        Some(422) => "422",
        Some(500) => "500",
        Some(_) => "other",
        None => "network_error",
    };

    metrics::counter!("wfh_api_requests_total", "method" => method.as_str(), "status" => status_label)
        .increment(1);
    metrics::histogram!("wfh_api_request_duration_seconds").record(elapsed_secs);
}
