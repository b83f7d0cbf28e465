//! 会话存储
//!
//! 持有 bearer 令牌，负责恢复、登录、登出和 401 强制失效。
//! 每次状态变化递增 epoch，请求发出时记录当时的 epoch，
//! 旧 epoch 的 401 响应不会再次触发登出。

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use super::token_store::TokenStore;
use crate::error::{ClientError, Result};

/// 会话快照
#[derive(Debug, Clone)]
pub struct Session {
    token: Option<Secret<String>>,
}

impl Session {
    fn new(token: Option<Secret<String>>) -> Self {
        Self { token }
    }

    pub fn token(&self) -> Option<&Secret<String>> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// 会话事件（UI 据此跳转）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    /// 令牌被服务端拒绝，需要重新登录
    Expired,
}

/// 请求发出时捕获的凭据
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: Option<Secret<String>>,
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<Secret<String>>,
    epoch: u64,
}

/// 会话存储（进程内唯一的全局可变状态）
pub struct SessionStore {
    store: Arc<dyn TokenStore>,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    /// 从持久化存储恢复会话，需在任何认证请求之前调用
    pub async fn restore(&self) -> Result<Session> {
        let mut state = self.state.write().await;
        let token = self.store.load().await?;

        state.token = token.map(Secret::new);
        state.epoch += 1;

        info!(authenticated = state.token.is_some(), "Session restored");
        Ok(Session::new(state.token.clone()))
    }

    /// 登录：持久化令牌并标记为已认证
    pub async fn login(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ClientError::validation("Access token must not be empty"));
        }

        let mut state = self.state.write().await;
        // 先落盘，失败时内存状态保持不变
        self.store.save(token).await?;

        state.token = Some(Secret::new(token.to_string()));
        state.epoch += 1;
        drop(state);

        info!("Session established");
        let _ = self.events.send(SessionEvent::LoggedIn);
        Ok(())
    }

    /// 登出：清除持久化令牌并标记为未认证
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.store.clear().await?;

        let was_authenticated = state.token.take().is_some();
        state.epoch += 1;
        drop(state);

        if was_authenticated {
            info!("Session cleared");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
        Ok(())
    }

    /// 401 处理：仅当 epoch 仍是当前值时清除会话
    ///
    /// 返回 true 表示本次调用触发了强制登出（每个令牌最多一次）
    pub async fn expire(&self, epoch: u64) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.token.is_none() {
            return Ok(false);
        }

        state.token = None;
        state.epoch += 1;
        let cleared = self.store.clear().await;
        drop(state);

        warn!("Access token rejected by server, session expired");
        let _ = self.events.send(SessionEvent::Expired);

        cleared.map(|_| true)
    }

    /// 当前会话快照
    pub async fn current(&self) -> Session {
        Session::new(self.state.read().await.token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.token.is_some()
    }

    /// 当前会话 epoch
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// 为即将发出的请求捕获凭据
    pub async fn credentials(&self) -> Credentials {
        let state = self.state.read().await;
        Credentials {
            token: state.token.clone(),
            epoch: state.epoch,
        }
    }

    /// 订阅会话事件
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

/// 令牌的脱敏预览，仅用于日志
pub fn token_preview(token: &Secret<String>) -> String {
    let exposed = token.expose_secret();
    let prefix: String = exposed.chars().take(4).collect();
    format!("{}…({} chars)", prefix, exposed.chars().count())
}
