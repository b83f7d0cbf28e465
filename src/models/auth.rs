//! Authentication-related models

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use validator::{Validate, ValidationError};

/// Login request
#[derive(Debug, Serialize, Validate)]
pub struct LoginRequest {
    #[validate(custom(function = "not_blank", message = "Please fill in all fields"))]
    pub email: String,
    #[serde(serialize_with = "expose")]
    #[validate(custom(function = "secret_not_blank", message = "Please fill in all fields"))]
    pub password: Secret<String>,
}

impl LoginRequest {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: Secret::new(password.to_string()),
        }
    }
}

/// Login response payload
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn secret_not_blank(value: &Secret<String>) -> Result<(), ValidationError> {
    not_blank(value.expose_secret())
}

/// 仅在序列化请求体时暴露密码
pub(crate) fn expose<S: Serializer>(value: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.expose_secret())
}
