//! 考勤汇总查询：分页 + 日期范围过滤
//!
//! 总页数始终来自服务端 meta，客户端只负责边界收敛

use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{endpoints, ApiGateway};
use crate::cache::ViewCache;
use crate::error::Result;
use crate::models::attendance::AttendanceRecord;
use crate::models::ApiEnvelope;

/// 默认每页条数
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// 汇总查询参数
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryQuery {
    pub page: u32,
    pub page_size: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SummaryQuery {
    /// 页码小于 1 时收敛到 1
    pub fn new(page: u32, page_size: u32, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            start_date,
            end_date,
        }
    }

    /// 本月第一天到今天
    pub fn current_month(page_size: u32, today: NaiveDate) -> Self {
        let start = today.with_day(1).unwrap_or(today);
        Self::new(1, page_size, start, today)
    }

    /// 起始日期晚于结束日期时结果为空页
    pub fn is_empty_range(&self) -> bool {
        self.start_date > self.end_date
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self::new(page, self.page_size, self.start_date, self.end_date)
    }

    fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("page", &self.page.to_string())
            .append_pair("limit", &self.page_size.to_string())
            .append_pair("start_date", &self.start_date.format("%Y-%m-%d").to_string())
            .append_pair("end_date", &self.end_date.format("%Y-%m-%d").to_string())
            .finish()
    }
}

/// 汇总结果页
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPage {
    pub items: Vec<AttendanceRecord>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
}

impl SummaryPage {
    pub fn empty(page: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: page.max(1),
            total_pages: 0,
        }
    }

    fn from_envelope(envelope: ApiEnvelope<Vec<AttendanceRecord>>, query: &SummaryQuery) -> Self {
        match envelope.meta {
            Some(meta) => Self {
                items: envelope.data,
                total: meta.total,
                page: meta.page.max(1),
                total_pages: meta.total_pages,
            },
            // 无 meta 时视为单页结果
            None => {
                let total = envelope.data.len() as u64;
                Self {
                    total_pages: u32::from(total > 0),
                    items: envelope.data,
                    total,
                    page: query.page,
                }
            }
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// 汇总查询服务
pub struct SummaryService {
    gateway: Arc<ApiGateway>,
    cache: Arc<ViewCache>,
}

impl SummaryService {
    pub fn new(gateway: Arc<ApiGateway>, cache: Arc<ViewCache>) -> Self {
        Self { gateway, cache }
    }

    /// 查询一页汇总（新鲜期内复用同参数的结果）
    pub async fn fetch(&self, query: &SummaryQuery) -> Result<SummaryPage> {
        let query = SummaryQuery::new(query.page, query.page_size, query.start_date, query.end_date);

        if query.is_empty_range() {
            debug!(
                start = %query.start_date,
                end = %query.end_date,
                "Start date after end date, returning empty page"
            );
            return Ok(SummaryPage::empty(query.page));
        }

        self.cache
            .bind_session(self.gateway.session().epoch().await)
            .await;
        if let Some(page) = self.cache.summary(&query).await {
            return Ok(page);
        }

        self.fetch_fresh(&query).await
    }

    /// 跳过缓存直接查询
    pub async fn fetch_fresh(&self, query: &SummaryQuery) -> Result<SummaryPage> {
        if query.is_empty_range() {
            return Ok(SummaryPage::empty(query.page));
        }

        self.cache
            .bind_session(self.gateway.session().epoch().await)
            .await;
        let epoch = self.cache.epoch().await;
        let endpoint = format!(
            "{}?{}",
            endpoints::ATTENDANCE_SUMMARY,
            query.to_query_string()
        );
        let envelope: ApiEnvelope<Vec<AttendanceRecord>> = self.gateway.get(&endpoint).await?;
        let page = SummaryPage::from_envelope(envelope, query);

        debug!(
            page = page.page,
            total = page.total,
            total_pages = page.total_pages,
            items = page.items.len(),
            "Fetched attendance summary"
        );

        self.cache.store_summary(epoch, query.clone(), page.clone()).await;
        Ok(page)
    }
}

#[derive(Debug)]
struct ViewState {
    query: SummaryQuery,
    page: Option<SummaryPage>,
    /// 每次发起请求递增，旧请求的结果会被丢弃
    seq: u64,
}

/// 汇总视图：持有当前过滤条件与页码
pub struct SummaryView {
    service: Arc<SummaryService>,
    state: Mutex<ViewState>,
}

impl SummaryView {
    pub fn new(service: Arc<SummaryService>, query: SummaryQuery) -> Self {
        Self {
            service,
            state: Mutex::new(ViewState {
                query,
                page: None,
                seq: 0,
            }),
        }
    }

    pub async fn query(&self) -> SummaryQuery {
        self.state.lock().await.query.clone()
    }

    pub async fn current(&self) -> Option<SummaryPage> {
        self.state.lock().await.page.clone()
    }

    /// 按当前条件加载；结果被更新的请求取代时返回 None
    pub async fn load(&self) -> Result<Option<SummaryPage>> {
        self.load_inner(false).await
    }

    /// 忽略缓存重新加载当前页
    pub async fn refresh(&self) -> Result<Option<SummaryPage>> {
        self.load_inner(true).await
    }

    async fn load_inner(&self, fresh: bool) -> Result<Option<SummaryPage>> {
        let (query, seq) = {
            let mut state = self.state.lock().await;
            state.seq += 1;
            (state.query.clone(), state.seq)
        };

        let result = if fresh {
            self.service.fetch_fresh(&query).await
        } else {
            self.service.fetch(&query).await
        };

        let mut state = self.state.lock().await;
        if state.seq != seq {
            debug!(seq, latest = state.seq, "Discarding superseded summary response");
            return Ok(None);
        }

        let page = result?;
        state.page = Some(page.clone());
        Ok(Some(page))
    }

    /// 修改日期范围，页码重置为 1
    pub async fn set_range(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Option<SummaryPage>> {
        {
            let mut state = self.state.lock().await;
            state.query = SummaryQuery::new(1, state.query.page_size, start_date, end_date);
            state.page = None;
        }
        self.load().await
    }

    pub async fn next_page(&self) -> Result<Option<SummaryPage>> {
        let target = self.state.lock().await.query.page.saturating_add(1);
        self.go_to(target).await
    }

    pub async fn prev_page(&self) -> Result<Option<SummaryPage>> {
        let target = self.state.lock().await.query.page.saturating_sub(1);
        self.go_to(target).await
    }

    /// 跳转到指定页；超出 [1, total_pages] 时不做任何事
    pub async fn go_to(&self, page: u32) -> Result<Option<SummaryPage>> {
        // 尚未加载时无法判断上界，先加载当前页再跳转
        let loaded = self.state.lock().await.page.is_some();
        if !loaded && self.load().await?.is_none() {
            return Ok(None);
        }

        {
            let mut state = self.state.lock().await;
            let Some(total_pages) = state.page.as_ref().map(|p| p.total_pages) else {
                return Ok(None);
            };

            if page < 1 || page > total_pages || page == state.query.page {
                debug!(page, total_pages, "Page navigation out of bounds, ignored");
                return Ok(state.page.clone());
            }
            state.query = state.query.with_page(page);
        }
        self.load().await
    }

    /// 放弃正在进行的请求（离开视图）
    pub async fn abandon(&self) {
        self.state.lock().await.seq += 1;
    }
}
