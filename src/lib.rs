//! 居家办公考勤客户端库
//! 会话管理、考勤打卡、汇总查询与个人资料

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod telemetry;

pub use client::WfhClient;
pub use error::{ClientError, Result};
