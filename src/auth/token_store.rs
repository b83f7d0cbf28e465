//! 令牌持久化
//!
//! 访问令牌以单个字符串保存在本地，进程重启后仍然有效

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{ClientError, Result};

/// 令牌存储后端
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 读取已保存的令牌，不存在时返回 None
    async fn load(&self) -> Result<Option<String>>;

    /// 保存令牌（覆盖旧值）
    async fn save(&self, token: &str) -> Result<()>;

    /// 删除令牌，不存在时视为成功
    async fn clear(&self) -> Result<()>;
}

/// 基于文件的令牌存储
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ClientError::Persistence(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::Persistence(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        tokio::fs::write(&self.path, token).await.map_err(|e| {
            ClientError::Persistence(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        // 令牌文件仅当前用户可读
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    ClientError::Persistence(format!(
                        "failed to restrict {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
        }

        debug!(path = %self.path.display(), "Token persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Persistence(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// 内存令牌存储（测试和嵌入场景使用）
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }

    /// 当前保存的令牌
    pub fn stored(&self) -> Option<String> {
        self.token.lock().map(|t| t.clone()).unwrap_or(None)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.stored())
    }

    async fn save(&self, token: &str) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| ClientError::persistence("token store lock poisoned"))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| ClientError::persistence("token store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
