//! 客户端装配
//!
//! 按配置创建会话、网关、缓存与各业务服务，供 CLI 或上层界面共享。

use chrono::Local;
use std::sync::Arc;

use crate::api::{ApiGateway, HttpTransport, ReqwestTransport};
use crate::auth::{FileTokenStore, SessionStore, TokenStore};
use crate::cache::ViewCache;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::services::{
    AttendanceService, AuthService, CloudinaryUploader, ImageUploader, ProfileService,
    SummaryQuery, SummaryService, SummaryView,
};

/// 客户端共享状态
///
/// 所有服务通过 Arc 共享同一个会话与缓存
#[derive(Clone)]
pub struct WfhClient {
    pub config: ClientConfig,
    pub session: Arc<SessionStore>,
    pub gateway: Arc<ApiGateway>,
    pub cache: Arc<ViewCache>,
    pub auth: Arc<AuthService>,
    pub attendance: Arc<AttendanceService>,
    pub summary: Arc<SummaryService>,
    pub profile: Arc<ProfileService>,
}

impl WfhClient {
    /// 生产装配：文件令牌存储 + reqwest + Cloudinary
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let token_path = config
            .token_path()
            .ok_or_else(|| ClientError::Config("cannot determine token file location".to_string()))?;
        let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::new(token_path));
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.request_timeout())?);
        let uploader: Arc<dyn ImageUploader> = Arc::new(CloudinaryUploader::from_config(
            &config.upload,
            config.request_timeout(),
        )?);

        Ok(Self::with_parts(config, store, transport, uploader))
    }

    /// 使用自定义的存储、传输层与上传器装配
    pub fn with_parts(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn HttpTransport>,
        uploader: Arc<dyn ImageUploader>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(store));
        let gateway = Arc::new(ApiGateway::new(
            config.api.base_url.clone(),
            transport,
            session.clone(),
        ));
        let cache = Arc::new(ViewCache::new(config.summary_stale_after()));

        let auth = Arc::new(AuthService::new(gateway.clone()));
        let attendance = Arc::new(AttendanceService::new(gateway.clone(), cache.clone()));
        let summary = Arc::new(SummaryService::new(gateway.clone(), cache.clone()));
        let profile = Arc::new(ProfileService::new(gateway.clone(), uploader));

        Self {
            config,
            session,
            gateway,
            cache,
            auth,
            attendance,
            summary,
            profile,
        }
    }

    /// 恢复持久化的会话，返回是否已登录
    pub async fn restore(&self) -> Result<bool> {
        self.auth.restore().await
    }

    /// 默认汇总视图：本月第一天到今天
    pub fn summary_view(&self) -> SummaryView {
        let query = SummaryQuery::current_month(
            self.config.summary.page_size,
            Local::now().date_naive(),
        );
        SummaryView::new(self.summary.clone(), query)
    }
}
