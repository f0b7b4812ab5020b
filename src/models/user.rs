use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::habit::{validate_clock_time, validate_weekdays};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub settings: Json<UserSettings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub theme: String,
    pub font_size: String,
    pub language: String,
    pub notifications: NotificationSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            theme: "light".into(),
            font_size: "medium".into(),
            language: "en".into(),
            notifications: NotificationSettings::default(),
        }
    }
}

impl UserSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.theme.as_str(), "light" | "dark") {
            return Err(format!("Unknown theme: {}", self.theme));
        }
        if !matches!(self.font_size.as_str(), "small" | "medium" | "large") {
            return Err(format!("Unknown font size: {}", self.font_size));
        }
        validate_clock_time(&self.notifications.reminder_time)?;
        validate_weekdays(&self.notifications.reminder_days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub email: bool,
    pub reminder_time: String,
    pub reminder_days: Vec<u8>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: false,
            reminder_time: "20:00".into(),
            reminder_days: vec![1, 2, 3, 4, 5],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub theme: Option<String>,
    pub font_size: Option<String>,
    pub language: Option<String>,
    pub notifications: Option<NotificationPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPatch {
    pub email: Option<bool>,
    pub reminder_time: Option<String>,
    pub reminder_days: Option<Vec<u8>>,
}

impl SettingsPatch {
    /// Merge field by field; absent fields keep their stored values.
    pub fn apply_to(self, mut base: UserSettings) -> Result<UserSettings, String> {
        if let Some(theme) = self.theme {
            base.theme = theme;
        }
        if let Some(font_size) = self.font_size {
            base.font_size = font_size;
        }
        if let Some(language) = self.language {
            base.language = language;
        }
        if let Some(n) = self.notifications {
            if let Some(email) = n.email {
                base.notifications.email = email;
            }
            if let Some(time) = n.reminder_time {
                base.notifications.reminder_time = time;
            }
            if let Some(days) = n.reminder_days {
                base.notifications.reminder_days = days;
            }
        }
        base.validate()?;
        Ok(base)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Please enter your name"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    pub password: Option<String>,
    pub settings: Option<SettingsPatch>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub settings: UserSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            settings: u.settings.0,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Register, login and profile-update response: profile plus access token.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub revoked: bool,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
