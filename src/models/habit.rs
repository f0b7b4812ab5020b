use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::services::streaks::Streak;

pub const DEFAULT_ICON: &str = "🎯";
pub const DEFAULT_COLOR: &str = "#8A5CF5";
pub const DEFAULT_CATEGORY: &str = "general";

/// 0 = Sunday .. 6 = Saturday
const ALL_WEEKDAYS: [u8; 7] = [0, 1, 2, 3, 4, 5, 6];

#[derive(Debug, Clone, FromRow)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub category: String,
    pub frequency: Json<Frequency>,
    pub reminder: Json<Reminder>,
    pub is_archived: bool,
    pub streak_current: i32,
    pub streak_longest: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Habit {
    pub fn streak(&self) -> Streak {
        Streak {
            current: self.streak_current,
            longest: self.streak_longest,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyKind {
    #[default]
    Daily,
    Weekly,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frequency {
    #[serde(rename = "type")]
    pub kind: FrequencyKind,
    pub days: Vec<u8>,
    pub times_per_period: u32,
}

impl Default for Frequency {
    fn default() -> Self {
        Self {
            kind: FrequencyKind::Daily,
            days: ALL_WEEKDAYS.to_vec(),
            times_per_period: 1,
        }
    }
}

impl Frequency {
    pub fn validate(&self) -> Result<(), String> {
        validate_weekdays(&self.days)?;
        if self.times_per_period == 0 {
            return Err("timesPerPeriod must be at least 1".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub enabled: bool,
    /// "HH:MM"
    pub time: String,
    pub days: Vec<u8>,
}

impl Default for Reminder {
    fn default() -> Self {
        Self {
            enabled: false,
            time: "09:00".into(),
            days: ALL_WEEKDAYS.to_vec(),
        }
    }
}

impl Reminder {
    pub fn validate(&self) -> Result<(), String> {
        validate_clock_time(&self.time)?;
        validate_weekdays(&self.days)
    }
}

pub fn validate_weekdays(days: &[u8]) -> Result<(), String> {
    match days.iter().find(|d| **d > 6) {
        Some(d) => Err(format!("Day {d} is invalid; must be 0-6 (Sun-Sat)")),
        None => Ok(()),
    }
}

pub fn validate_clock_time(time: &str) -> Result<(), String> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map(|_| ())
        .map_err(|_| format!("Time {time} is invalid; expected HH:MM"))
}

/// Titles are stored trimmed, so the length rule applies after trimming.
fn validate_title(title: &str) -> Result<(), ValidationError> {
    if (1..=200).contains(&title.trim().chars().count()) {
        return Ok(());
    }
    let mut err = ValidationError::new("title_length");
    err.message = Some("Title must be 1-200 characters".into());
    Err(err)
}

/// Partial frequency sent on update; present fields overwrite stored ones.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyPatch {
    #[serde(rename = "type")]
    pub kind: Option<FrequencyKind>,
    pub days: Option<Vec<u8>>,
    pub times_per_period: Option<u32>,
}

impl FrequencyPatch {
    pub fn apply_to(self, mut base: Frequency) -> Frequency {
        if let Some(kind) = self.kind {
            base.kind = kind;
        }
        if let Some(days) = self.days {
            base.days = days;
        }
        if let Some(times) = self.times_per_period {
            base.times_per_period = times;
        }
        base
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPatch {
    pub enabled: Option<bool>,
    pub time: Option<String>,
    pub days: Option<Vec<u8>>,
}

impl ReminderPatch {
    pub fn apply_to(self, mut base: Reminder) -> Reminder {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(time) = self.time {
            base.time = time;
        }
        if let Some(days) = self.days {
            base.days = days;
        }
        base
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateHabitRequest {
    #[validate(custom = "validate_title")]
    pub title: String,
    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub category: Option<String>,
    pub frequency: Option<FrequencyPatch>,
    pub reminder: Option<ReminderPatch>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHabitRequest {
    #[validate(custom = "validate_title")]
    pub title: Option<String>,
    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub category: Option<String>,
    pub frequency: Option<FrequencyPatch>,
    pub reminder: Option<ReminderPatch>,
    pub is_archived: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitListQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub category: String,
    pub frequency: Frequency,
    pub reminder: Reminder,
    pub is_archived: bool,
    pub streak: Streak,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Habit> for HabitResponse {
    fn from(h: Habit) -> Self {
        let streak = h.streak();
        Self {
            id: h.id,
            user_id: h.user_id,
            title: h.title,
            description: h.description,
            icon: h.icon,
            color: h.color,
            category: h.category,
            frequency: h.frequency.0,
            reminder: h.reminder.0,
            is_archived: h.is_archived,
            streak,
            created_at: h.created_at,
            updated_at: h.updated_at,
        }
    }
}
