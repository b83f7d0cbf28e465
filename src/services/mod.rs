//! 业务服务层

pub mod attendance_service;
pub mod auth_service;
pub mod profile_service;
pub mod summary_service;
pub mod upload_service;

pub use attendance_service::{
    AttendanceAction, AttendanceService, AttendanceState, PollHandle, TodayStatus,
};
pub use auth_service::AuthService;
pub use profile_service::{avatar_url, ProfileDraft, ProfileService};
pub use summary_service::{SummaryPage, SummaryQuery, SummaryService, SummaryView};
pub use upload_service::{CloudinaryUploader, ImageUploader, PhotoFile, UploadedImage};
