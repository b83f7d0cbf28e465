//! 后端 API 访问层

pub mod gateway;
pub mod transport;

pub use gateway::ApiGateway;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

/// 后端端点
pub mod endpoints {
    pub const LOGIN: &str = "/auth/login";
    pub const PROFILE: &str = "/staff/profile";
    pub const ATTENDANCE_TODAY: &str = "/staff/attendance/today";
    pub const CHECK_IN: &str = "/staff/attendance/check-in";
    pub const CHECK_OUT: &str = "/staff/attendance/check-out";
    pub const ATTENDANCE_SUMMARY: &str = "/staff/attendance/summary";
}
