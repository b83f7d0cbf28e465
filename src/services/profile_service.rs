//! 个人资料服务：读取与修改手机号、密码、头像

use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::upload_service::{ImageUploader, PhotoFile};
use crate::api::{endpoints, ApiGateway};
use crate::error::{ClientError, Result};
use crate::models::profile::{Profile, ProfileUpdate};
use crate::models::ApiEnvelope;

/// 资料编辑草稿，只在编辑期间存在
#[derive(Debug, Clone)]
pub struct ProfileDraft {
    base: Profile,
    pub phone: Option<String>,
    pub password: Option<Secret<String>>,
    pub pending_photo: Option<PhotoFile>,
    /// 已上传但尚未提交的头像地址，重试保存时复用
    uploaded_photo_url: Option<String>,
}

impl ProfileDraft {
    /// 进入编辑模式，手机号以当前值为初始值
    pub fn begin(profile: &Profile) -> Self {
        Self {
            base: profile.clone(),
            phone: profile.phone.clone(),
            password: None,
            pending_photo: None,
            uploaded_photo_url: None,
        }
    }

    pub fn base(&self) -> &Profile {
        &self.base
    }

    pub fn set_phone(&mut self, phone: impl Into<String>) {
        self.phone = Some(phone.into());
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(Secret::new(password.into()));
    }

    pub fn select_photo(&mut self, photo: PhotoFile) {
        self.pending_photo = Some(photo);
        self.uploaded_photo_url = None;
    }

    /// 取消编辑，丢弃所有修改
    pub fn cancel(&mut self) {
        *self = Self::begin(&self.base);
    }

    /// 是否存在需要提交的修改
    pub fn has_changes(&self) -> bool {
        self.changed_phone().is_some()
            || self
                .password
                .as_ref()
                .is_some_and(|p| !p.expose_secret().is_empty())
            || self.pending_photo.is_some()
    }

    fn changed_phone(&self) -> Option<String> {
        let phone = self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())?;
        if Some(phone) == self.base.phone.as_deref() {
            return None;
        }
        Some(phone.to_string())
    }
}

/// 个人资料服务
pub struct ProfileService {
    gateway: Arc<ApiGateway>,
    uploader: Arc<dyn ImageUploader>,
}

impl ProfileService {
    pub fn new(gateway: Arc<ApiGateway>, uploader: Arc<dyn ImageUploader>) -> Self {
        Self { gateway, uploader }
    }

    pub async fn load_profile(&self) -> Result<Profile> {
        let envelope: ApiEnvelope<Profile> = self.gateway.get(endpoints::PROFILE).await?;
        Ok(envelope.data)
    }

    /// 保存草稿
    ///
    /// 无修改时直接返回原资料且不发请求；选择了新头像时先上传，
    /// 上传失败则整体中止并保留草稿。密码无论成败都会从草稿中清除。
    /// 提交成功后即清空草稿；随后的重新读取失败时返回按提交内容合成的资料。
    pub async fn save_profile(&self, draft: &mut ProfileDraft) -> Result<Profile> {
        let password = draft
            .password
            .take()
            .filter(|p| !p.expose_secret().is_empty());

        let mut update = ProfileUpdate {
            phone: draft.changed_phone(),
            password,
            photo_url: None,
        };

        if let Some(photo) = &draft.pending_photo {
            let url = match draft.uploaded_photo_url.clone() {
                Some(url) => url,
                None => {
                    let uploaded = self.uploader.upload(photo).await.map_err(|e| {
                        warn!(error = %e, "Photo upload failed, profile not saved");
                        match e {
                            ClientError::Upload(_) => e,
                            other => ClientError::Upload(other.to_string()),
                        }
                    })?;
                    draft.uploaded_photo_url = Some(uploaded.secure_url.clone());
                    uploaded.secure_url
                }
            };
            update.photo_url = Some(url);
        }

        if update.is_empty() {
            debug!("No profile changes to save");
            return Ok(draft.base.clone());
        }

        let fields = update.changed_fields();
        let _: ApiEnvelope<Option<serde_json::Value>> =
            self.gateway.patch(endpoints::PROFILE, &update).await?;
        info!(fields = ?fields, "Profile updated");

        // 服务端已提交，草稿立即以提交后的资料为基准
        let mut applied = draft.base.clone();
        if let Some(phone) = update.phone.take() {
            applied.phone = Some(phone);
        }
        if let Some(photo_url) = update.photo_url.take() {
            applied.photo_url = Some(photo_url);
        }
        *draft = ProfileDraft::begin(&applied);

        match self.load_profile().await {
            Ok(profile) => {
                *draft = ProfileDraft::begin(&profile);
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "Profile saved but reload failed, using submitted values");
                Ok(applied)
            }
        }
    }
}

/// 头像地址；未设置时使用按姓名生成的默认头像
pub fn avatar_url(profile: &Profile) -> String {
    match profile.photo_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => {
            let name = if profile.name.trim().is_empty() {
                "User"
            } else {
                profile.name.trim()
            };
            let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
            format!(
                "https://ui-avatars.com/api/?name={}&size=200&background=4F46E5&color=fff",
                encoded
            )
        }
    }
}
