//! 认证服务：登录、登出

use secrecy::Secret;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::{
    api::{endpoints, ApiGateway},
    auth::{session::token_preview, SessionStore},
    error::{ClientError, Result},
    models::auth::{LoginRequest, LoginResponse},
    models::ApiEnvelope,
};

pub struct AuthService {
    gateway: Arc<ApiGateway>,
}

impl AuthService {
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        Self { gateway }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.gateway.session()
    }

    /// 用户登录
    ///
    /// 字段为空时直接返回校验错误，不发请求。
    /// 服务端拒绝时返回服务端消息，会话保持未登录。
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let req = LoginRequest::new(email, password);
        req.validate()?;

        let envelope: ApiEnvelope<LoginResponse> =
            self.gateway.post(endpoints::LOGIN, &req).await?;

        let token = envelope.data.access_token;
        if token.trim().is_empty() {
            return Err(ClientError::Decode("login response has no access token".to_string()));
        }

        self.session().login(&token).await?;

        debug!(
            token = %token_preview(&Secret::new(token.clone())),
            "Access token stored"
        );
        info!(email = %req.email, "Logged in");
        Ok(())
    }

    /// 用户登出（清除本地令牌）
    pub async fn logout(&self) -> Result<()> {
        self.session().logout().await?;
        info!("Logged out");
        Ok(())
    }

    /// 启动时恢复已保存的令牌
    pub async fn restore(&self) -> Result<bool> {
        let session = self.session().restore().await?;
        if let Some(token) = session.token() {
            debug!(token = %token_preview(token), "Session restored");
        }
        Ok(session.is_authenticated())
    }
}
