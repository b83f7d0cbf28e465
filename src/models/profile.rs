//! Staff profile models

use secrecy::Secret;
use serde::{Deserialize, Serialize};

/// 员工资料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// `PATCH /staff/profile` 请求体，未设置的字段不发送
#[derive(Debug, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "expose_opt"
    )]
    pub password: Option<Secret<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.password.is_none() && self.photo_url.is_none()
    }

    /// 变更字段名列表，仅用于日志
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.phone.is_some() {
            fields.push("phone");
        }
        if self.password.is_some() {
            fields.push("password");
        }
        if self.photo_url.is_some() {
            fields.push("photo_url");
        }
        fields
    }
}

fn expose_opt<S: serde::Serializer>(
    value: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(secret) => super::auth::expose(secret, serializer),
        None => serializer.serialize_none(),
    }
}
