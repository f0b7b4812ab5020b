use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::dates::deserialize_optional_day;
use crate::services::streaks::Streak;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "date")]
    pub completed_on: NaiveDate,
    pub completed: bool,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/habits/:id/complete` and `/uncomplete`.
#[derive(Debug, Default, Deserialize)]
pub struct CompletionRequest {
    #[serde(default, deserialize_with = "deserialize_optional_day")]
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
}

impl CompletionRequest {
    /// The note only counts when it carries text.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref().filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    #[serde(default, deserialize_with = "deserialize_optional_day")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_day")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub completion: Completion,
    pub streak: Streak,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UncompleteResponse {
    pub message: String,
    /// Present when the record was kept (uncompleted with a note).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    pub streak: Streak,
}

/// (habit, day) pair of a completed record, the only shape statistics need.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct CompletedDay {
    pub habit_id: Uuid,
    pub completed_on: NaiveDate,
}

#[derive(Debug, FromRow)]
pub struct CompletionWithHabitRow {
    #[sqlx(flatten)]
    pub completion: Completion,
    pub habit_title: String,
    pub habit_icon: String,
    pub habit_color: String,
}

#[derive(Debug, Serialize)]
pub struct HabitBadge {
    pub id: Uuid,
    pub title: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionWithHabit {
    #[serde(flatten)]
    pub completion: Completion,
    pub habit: HabitBadge,
}

impl From<CompletionWithHabitRow> for CompletionWithHabit {
    fn from(row: CompletionWithHabitRow) -> Self {
        let habit = HabitBadge {
            id: row.completion.habit_id,
            title: row.habit_title,
            icon: row.habit_icon,
            color: row.habit_color,
        };
        Self {
            completion: row.completion,
            habit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_empty_body() {
        let req: CompletionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.date.is_none());
        assert!(req.note().is_none());
    }

    #[test]
    fn test_completion_request_blank_note_ignored() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"date":"2024-01-02T18:45:00.000Z","note":""}"#).unwrap();
        assert_eq!(req.date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert!(req.note().is_none());
    }

    #[test]
    fn test_completion_serializes_date_field() {
        let now = Utc::now();
        let c = Completion {
            id: Uuid::new_v4(),
            habit_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            completed_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            completed: true,
            note: String::new(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["date"], "2024-01-01");
        assert_eq!(json["completed"], true);
        assert!(json.get("habitId").is_some());
    }

    #[test]
    fn test_uncomplete_response_omits_missing_completion() {
        let resp = UncompleteResponse {
            message: "Habit unmarked".into(),
            completion: None,
            streak: Streak { current: 0, longest: 3 },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("completion").is_none());
        assert_eq!(json["streak"]["longest"], 3);
    }
}
