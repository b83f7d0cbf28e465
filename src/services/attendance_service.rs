//! 考勤服务：今日状态、打卡、签退与状态轮询
//!
//! 状态机：NoRecord -> CheckedIn -> CheckedInAndOut（当日终态）。
//! 服务端快照是权威数据，客户端只在快照已禁止时提前拦截请求。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{endpoints, ApiGateway};
use crate::cache::ViewCache;
use crate::error::{ClientError, Result};
use crate::models::attendance::{AttendanceRecord, TodayResponse};
use crate::models::ApiEnvelope;

/// 当日考勤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    NoRecord,
    CheckedIn,
    CheckedInAndOut,
}

impl AttendanceState {
    /// 根据当日记录推导状态
    pub fn from_record(record: Option<&AttendanceRecord>) -> Self {
        match record {
            Some(r) if r.check_in.is_some() && r.check_out.is_some() => {
                AttendanceState::CheckedInAndOut
            }
            Some(r) if r.check_in.is_some() => AttendanceState::CheckedIn,
            _ => AttendanceState::NoRecord,
        }
    }

    pub fn can_check_in(&self) -> bool {
        matches!(self, AttendanceState::NoRecord)
    }

    pub fn can_check_out(&self) -> bool {
        matches!(self, AttendanceState::CheckedIn)
    }
}

impl std::fmt::Display for AttendanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            AttendanceState::NoRecord => "not checked in yet",
            AttendanceState::CheckedIn => "already checked in",
            AttendanceState::CheckedInAndOut => "already checked in and out today",
        };
        f.write_str(text)
    }
}

/// 考勤动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceAction {
    CheckIn,
    CheckOut,
}

impl AttendanceAction {
    pub fn endpoint(&self) -> &'static str {
        match self {
            AttendanceAction::CheckIn => endpoints::CHECK_IN,
            AttendanceAction::CheckOut => endpoints::CHECK_OUT,
        }
    }
}

impl std::fmt::Display for AttendanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceAction::CheckIn => f.write_str("check in"),
            AttendanceAction::CheckOut => f.write_str("check out"),
        }
    }
}

/// 今日状态（每次拉取后由服务端快照推导，不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayStatus {
    pub record: Option<AttendanceRecord>,
    pub can_check_in: bool,
    pub can_check_out: bool,
}

impl TodayStatus {
    /// 由服务端响应构建
    ///
    /// 服务端标志优先；若标志违反互斥约束或与终态矛盾，则回退到由记录推导的标志
    pub fn from_response(response: TodayResponse) -> Self {
        let derived = AttendanceState::from_record(response.attendance.as_ref());
        let (server_in, server_out) = (response.can_check_in, response.can_check_out);

        let contradicts_terminal =
            derived == AttendanceState::CheckedInAndOut && (server_in || server_out);
        let (can_check_in, can_check_out) = if (server_in && server_out) || contradicts_terminal {
            warn!(
                state = %derived,
                can_check_in = server_in,
                can_check_out = server_out,
                "Inconsistent eligibility flags from server, using record state"
            );
            (derived.can_check_in(), derived.can_check_out())
        } else {
            if (server_in, server_out) != (derived.can_check_in(), derived.can_check_out()) {
                debug!(
                    state = %derived,
                    can_check_in = server_in,
                    can_check_out = server_out,
                    "Server eligibility differs from record state"
                );
            }
            (server_in, server_out)
        };

        Self {
            record: response.attendance,
            can_check_in,
            can_check_out,
        }
    }

    pub fn state(&self) -> AttendanceState {
        AttendanceState::from_record(self.record.as_ref())
    }

    pub fn allows(&self, action: AttendanceAction) -> bool {
        match action {
            AttendanceAction::CheckIn => self.can_check_in,
            AttendanceAction::CheckOut => self.can_check_out,
        }
    }

    /// 当前唯一可执行的动作
    pub fn next_action(&self) -> Option<AttendanceAction> {
        if self.can_check_in {
            Some(AttendanceAction::CheckIn)
        } else if self.can_check_out {
            Some(AttendanceAction::CheckOut)
        } else {
            None
        }
    }
}

/// 考勤服务
pub struct AttendanceService {
    gateway: Arc<ApiGateway>,
    cache: Arc<ViewCache>,
    /// 同一时间只允许一个打卡请求
    in_flight: Arc<Semaphore>,
    status_tx: watch::Sender<Option<TodayStatus>>,
}

impl AttendanceService {
    pub fn new(gateway: Arc<ApiGateway>, cache: Arc<ViewCache>) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self {
            gateway,
            cache,
            in_flight: Arc::new(Semaphore::new(1)),
            status_tx,
        }
    }

    /// 订阅今日状态更新（只推送未过期的结果）
    pub fn subscribe(&self) -> watch::Receiver<Option<TodayStatus>> {
        self.status_tx.subscribe()
    }

    /// 是否有打卡请求正在进行
    pub fn is_pending(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// 会话变化后丢弃上一会话的今日状态
    async fn sync_session(&self) {
        let session_epoch = self.gateway.session().epoch().await;
        if self.cache.bind_session(session_epoch).await {
            self.status_tx.send_replace(None);
        }
    }

    /// 拉取今日状态（幂等，可周期调用）
    pub async fn fetch_today(&self) -> Result<TodayStatus> {
        self.sync_session().await;
        let epoch = self.cache.epoch().await;
        let envelope: ApiEnvelope<TodayResponse> =
            self.gateway.get(endpoints::ATTENDANCE_TODAY).await?;
        let status = TodayStatus::from_response(envelope.data);

        if self.cache.store_today(epoch, status.clone()).await {
            self.status_tx.send_replace(Some(status.clone()));
            return Ok(status);
        }

        // 拉取期间发生了打卡，优先返回失效后的新结果
        match self.cache.today().await {
            Some(fresh) => Ok(fresh),
            None => Ok(status),
        }
    }

    /// 缓存的今日状态，过期或失效时重新拉取
    pub async fn today(&self) -> Result<TodayStatus> {
        self.sync_session().await;
        if let Some(status) = self.cache.today().await {
            return Ok(status);
        }
        self.fetch_today().await
    }

    /// 打卡
    pub async fn check_in(&self) -> Result<AttendanceRecord> {
        self.transition(AttendanceAction::CheckIn).await
    }

    /// 签退
    pub async fn check_out(&self) -> Result<AttendanceRecord> {
        self.transition(AttendanceAction::CheckOut).await
    }

    /// 执行当前允许的动作（打卡或签退）
    pub async fn toggle(&self) -> Result<(AttendanceAction, AttendanceRecord)> {
        let status = self.today().await?;
        let action = match status.next_action() {
            Some(action) => action,
            None => {
                let state = status.state();
                let action = if state == AttendanceState::NoRecord {
                    AttendanceAction::CheckIn
                } else {
                    AttendanceAction::CheckOut
                };
                return Err(ClientError::InvalidTransition { state, action });
            }
        };

        let record = self.transition(action).await?;
        Ok((action, record))
    }

    async fn transition(&self, action: AttendanceAction) -> Result<AttendanceRecord> {
        // 重复提交直接拒绝，不排队
        let _permit = self
            .in_flight
            .clone()
            .try_acquire_owned()
            .map_err(|_| ClientError::TransitionInFlight)?;

        let status = self.today().await?;
        if !status.allows(action) {
            let state = status.state();
            debug!(action = %action, state = %state, "Attendance transition blocked locally");
            return Err(ClientError::InvalidTransition { state, action });
        }

        info!(action = %action, "Submitting attendance transition");
        let result: Result<ApiEnvelope<AttendanceRecord>> =
            self.gateway.post_empty(action.endpoint()).await;

        match result {
            Ok(envelope) => {
                info!(
                    action = %action,
                    record_id = envelope.data.id,
                    "Attendance transition accepted"
                );
                self.refresh_after_mutation().await;
                Ok(envelope.data)
            }
            Err(ClientError::Auth) => Err(ClientError::Auth),
            Err(e) => {
                // 服务端拒绝时同样以服务端快照为准
                if matches!(e, ClientError::Api { .. }) {
                    self.refresh_after_mutation().await;
                }
                warn!(action = %action, error = %e, "Attendance transition failed");
                Err(e)
            }
        }
    }

    /// 使今日与汇总缓存失效并立即重新拉取今日状态
    async fn refresh_after_mutation(&self) {
        self.cache.invalidate_attendance().await;
        if let Err(e) = self.fetch_today().await {
            warn!(error = %e, "Failed to refresh today status after transition");
        }
    }

    /// 启动固定间隔的今日状态轮询
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> PollHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let service = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // 取消后放弃正在进行的请求结果
                let result = tokio::select! {
                    _ = token.cancelled() => break,
                    result = service.fetch_today() => result,
                };

                match result {
                    Ok(status) => debug!(state = %status.state(), "Polled today status"),
                    Err(ClientError::Auth) => {
                        warn!("Session expired, stopping today status poller");
                        break;
                    }
                    Err(e) => warn!(error = %e, "Failed to poll today status"),
                }
            }

            debug!("Today status poller stopped");
        });

        PollHandle {
            cancel,
            task: Some(task),
        }
    }
}

impl std::fmt::Debug for AttendanceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceService")
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

/// 轮询任务句柄，drop 时自动停止
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 停止轮询并等待任务退出
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
