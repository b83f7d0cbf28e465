//! 配置系统
//! 从默认值与环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// 后端 API 地址，例如 "https://api.example.com/api"
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// 图床 cloud name（未配置时上传直接失败）
    pub cloud_name: Option<String>,
    /// 未签名上传的 preset（使用 Secret 包装，防止日志泄露）
    pub upload_preset: Option<Secret<String>>,
    /// 上传目标目录
    pub folder: String,
    /// 图床 API 地址
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// 令牌文件路径（为空时使用系统配置目录）
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceConfig {
    /// 今日状态轮询间隔（秒）
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    /// 每页条数
    pub page_size: u32,
    /// 查询结果新鲜期（秒）
    pub stale_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub attendance: AttendanceConfig,
    pub summary: SummaryConfig,
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("api.base_url", "http://localhost:3000/api")?
            .set_default("api.timeout_secs", 30)?
            .set_default("upload.folder", "employee-photos")?
            .set_default("upload.endpoint", "https://api.cloudinary.com/v1_1")?
            .set_default("attendance.poll_interval_secs", 30)?
            .set_default("summary.page_size", 10)?
            .set_default("summary.stale_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?;

        // 从环境变量加载配置（前缀为 WFH_）
        settings = settings.add_source(
            Environment::with_prefix("WFH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: ClientConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    fn validate(&self) -> Result<(), ConfigError> {
        // 验证 API 地址
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::Message(format!("Invalid api.base_url '{}': {}", self.api.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Message(
                "api.base_url must use http or https".to_string(),
            ));
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                )))
            }
        }

        if self.api.timeout_secs == 0 || self.api.timeout_secs > 300 {
            return Err(ConfigError::Message(
                "api.timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        if self.attendance.poll_interval_secs < 5 || self.attendance.poll_interval_secs > 3600 {
            return Err(ConfigError::Message(
                "attendance.poll_interval_secs must be between 5 and 3600".to_string(),
            ));
        }

        if self.summary.page_size == 0 || self.summary.page_size > 100 {
            return Err(ConfigError::Message(
                "summary.page_size must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.attendance.poll_interval_secs)
    }

    pub fn summary_stale_after(&self) -> Duration {
        Duration::from_secs(self.summary.stale_secs)
    }

    /// 令牌文件路径：显式配置优先，否则放在系统配置目录
    pub fn token_path(&self) -> Option<PathBuf> {
        self.session.token_path.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("wfh-client").join("access_token"))
        })
    }
}
