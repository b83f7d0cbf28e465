//! 视图查询缓存
//!
//! 今日状态与考勤汇总各有一份短时缓存（新鲜期内复用），
//! 打卡成功后整体失效。epoch 用于丢弃失效前发出的轮询结果。
//! 缓存绑定到会话 epoch，登录、登出或过期后上一会话的视图全部丢弃。

use moka::future::Cache;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::services::attendance_service::TodayStatus;
use crate::services::summary_service::{SummaryPage, SummaryQuery};

const TODAY_CAPACITY: u64 = 8;
/// 汇总缓存的最大条目数
const SUMMARY_CAPACITY: u64 = 256;

/// 考勤相关视图缓存
pub struct ViewCache {
    today: Cache<(), TodayStatus>,
    summary: Cache<SummaryQuery, SummaryPage>,
    /// 写入与失效在同一把锁下进行，避免失效后写入旧数据
    epoch: Mutex<u64>,
    /// 缓存内容所属的会话 epoch
    session: Mutex<Option<u64>>,
}

impl ViewCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            today: Cache::builder()
                .max_capacity(TODAY_CAPACITY)
                .time_to_live(stale_after)
                .build(),
            summary: Cache::builder()
                .max_capacity(SUMMARY_CAPACITY)
                .time_to_live(stale_after)
                .build(),
            epoch: Mutex::new(0),
            session: Mutex::new(None),
        }
    }

    /// 当前失效代数，请求发出前读取
    pub async fn epoch(&self) -> u64 {
        *self.epoch.lock().await
    }

    pub async fn today(&self) -> Option<TodayStatus> {
        self.today.get(&()).await
    }

    /// 写入今日状态；请求发出后缓存已失效则丢弃，返回是否写入
    pub async fn store_today(&self, epoch: u64, status: TodayStatus) -> bool {
        let current = self.epoch.lock().await;
        if *current != epoch {
            debug!(epoch, current = *current, "Dropping stale today status");
            return false;
        }
        self.today.insert((), status).await;
        true
    }

    pub async fn summary(&self, query: &SummaryQuery) -> Option<SummaryPage> {
        self.summary.get(query).await
    }

    pub async fn store_summary(&self, epoch: u64, query: SummaryQuery, page: SummaryPage) -> bool {
        let current = self.epoch.lock().await;
        if *current != epoch {
            debug!(epoch, current = *current, "Dropping stale summary page");
            return false;
        }
        self.summary.insert(query, page).await;
        true
    }

    /// 打卡后使今日状态与汇总同时失效，返回新的 epoch
    pub async fn invalidate_attendance(&self) -> u64 {
        let mut current = self.epoch.lock().await;
        *current += 1;
        self.today.invalidate_all();
        self.summary.invalidate_all();
        debug!(epoch = *current, "Attendance views invalidated");
        *current
    }

    /// 读写缓存前调用；会话 epoch 变化时清空所有视图，返回是否清空
    pub async fn bind_session(&self, session_epoch: u64) -> bool {
        let mut bound = self.session.lock().await;
        match *bound {
            Some(previous) if previous == session_epoch => false,
            Some(previous) => {
                *bound = Some(session_epoch);
                debug!(previous, session_epoch, "Session changed, dropping cached views");
                self.invalidate_attendance().await;
                true
            }
            None => {
                *bound = Some(session_epoch);
                false
            }
        }
    }
}

impl std::fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn no_record() -> TodayStatus {
        TodayStatus {
            record: None,
            can_check_in: true,
            can_check_out: false,
        }
    }

    fn query() -> SummaryQuery {
        SummaryQuery::new(
            1,
            10,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_store_and_read_today() {
        let cache = ViewCache::new(Duration::from_secs(30));
        let epoch = cache.epoch().await;
        assert!(cache.store_today(epoch, no_record()).await);
        assert_eq!(cache.today().await, Some(no_record()));
    }

    #[tokio::test]
    async fn test_stale_write_after_invalidation_is_dropped() {
        let cache = ViewCache::new(Duration::from_secs(30));
        let before = cache.epoch().await;

        cache.invalidate_attendance().await;

        assert!(!cache.store_today(before, no_record()).await);
        assert!(cache.today().await.is_none());
        assert!(
            !cache
                .store_summary(before, query(), SummaryPage::empty(1))
                .await
        );
    }

    #[tokio::test]
    async fn test_invalidation_clears_both_views() {
        let cache = ViewCache::new(Duration::from_secs(30));
        let epoch = cache.epoch().await;
        cache.store_today(epoch, no_record()).await;
        cache.store_summary(epoch, query(), SummaryPage::empty(1)).await;

        cache.invalidate_attendance().await;

        assert!(cache.today().await.is_none());
        assert!(cache.summary(&query()).await.is_none());
    }

    #[tokio::test]
    async fn test_session_change_drops_views() {
        let cache = ViewCache::new(Duration::from_secs(30));
        assert!(!cache.bind_session(1).await);
        let epoch = cache.epoch().await;
        cache.store_today(epoch, no_record()).await;
        cache.store_summary(epoch, query(), SummaryPage::empty(1)).await;

        assert!(!cache.bind_session(1).await);
        assert!(cache.today().await.is_some());

        assert!(cache.bind_session(2).await);
        assert!(cache.today().await.is_none());
        assert!(cache.summary(&query()).await.is_none());
        // 旧会话发出的请求结果不能写回
        assert!(!cache.store_today(epoch, no_record()).await);
    }
}
