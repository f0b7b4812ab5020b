use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::services::dates::deserialize_optional_day;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, Default)]
#[sqlx(type_name = "mood_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MoodKind {
    Happy,
    Good,
    #[default]
    Neutral,
    Bad,
    Awful,
}

impl MoodKind {
    /// Fixed sentiment scale used for the average.
    pub fn weight(self) -> i64 {
        match self {
            MoodKind::Happy => 5,
            MoodKind::Good => 4,
            MoodKind::Neutral => 3,
            MoodKind::Bad => 2,
            MoodKind::Awful => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Mood {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "date")]
    pub mood_on: NaiveDate,
    pub mood: MoodKind,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row returned by the per-day upsert; `inserted` is false when an existing
/// entry for the day was overwritten.
#[derive(Debug, FromRow)]
pub struct UpsertedMood {
    #[sqlx(flatten)]
    pub mood: Mood,
    pub inserted: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MoodRequest {
    pub mood: Option<MoodKind>,
    #[validate(length(max = 5000, message = "Note must be under 5000 characters"))]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_day")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMoodRequest {
    pub mood: Option<MoodKind>,
    #[validate(length(max = 5000, message = "Note must be under 5000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, FromRow, PartialEq, Eq)]
pub struct MoodCount {
    pub mood: MoodKind,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoodStats {
    pub stats: Vec<MoodCount>,
    pub total_moods: i64,
    pub average_mood: f64,
}
