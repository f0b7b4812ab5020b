use axum::{extract::State, http::StatusCode, Extension, Json};
use serde_json::{json, Value};
use sqlx::types::Json as DbJson;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::habit::{
    CreateHabitRequest, Frequency, Habit, HabitListQuery, HabitResponse, Reminder,
    UpdateHabitRequest, DEFAULT_CATEGORY, DEFAULT_COLOR, DEFAULT_ICON,
};
use crate::AppState;

async fn find_owned_habit(
    db: &sqlx::PgPool,
    habit_id: Uuid,
    user_id: Uuid,
) -> AppResult<Habit> {
    sqlx::query_as::<_, Habit>("SELECT * FROM habits WHERE id = $1 AND user_id = $2")
        .bind(habit_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Habit not found".into()))
}

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<HabitListQuery>,
) -> AppResult<Json<Vec<HabitResponse>>> {
    let habits = sqlx::query_as::<_, Habit>(
        r#"
        SELECT * FROM habits
        WHERE user_id = $1 AND ($2 OR is_archived = false)
        ORDER BY created_at ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.include_archived)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(habits.into_iter().map(HabitResponse::from).collect()))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(habit_id): AppPath<Uuid>,
) -> AppResult<Json<HabitResponse>> {
    let habit = find_owned_habit(&state.db, habit_id, auth_user.id).await?;
    Ok(Json(habit.into()))
}

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<CreateHabitRequest>,
) -> AppResult<(StatusCode, Json<HabitResponse>)> {
    body.validate()?;

    let frequency = body
        .frequency
        .map(|patch| patch.apply_to(Frequency::default()))
        .unwrap_or_default();
    frequency.validate().map_err(AppError::Validation)?;

    let reminder = body
        .reminder
        .map(|patch| patch.apply_to(Reminder::default()))
        .unwrap_or_default();
    reminder.validate().map_err(AppError::Validation)?;

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        INSERT INTO habits (id, user_id, title, description, icon, color, category, frequency, reminder)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(body.title.trim())
    .bind(body.description.unwrap_or_default())
    .bind(body.icon.unwrap_or_else(|| DEFAULT_ICON.into()))
    .bind(body.color.unwrap_or_else(|| DEFAULT_COLOR.into()))
    .bind(body.category.unwrap_or_else(|| DEFAULT_CATEGORY.into()))
    .bind(DbJson(&frequency))
    .bind(DbJson(&reminder))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(user_id = %auth_user.id, habit_id = %habit.id, "Habit created");
    Ok((StatusCode::CREATED, Json(habit.into())))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(habit_id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateHabitRequest>,
) -> AppResult<Json<HabitResponse>> {
    body.validate()?;
    let existing = find_owned_habit(&state.db, habit_id, auth_user.id).await?;

    let frequency = match body.frequency {
        Some(patch) => patch.apply_to(existing.frequency.0),
        None => existing.frequency.0,
    };
    frequency.validate().map_err(AppError::Validation)?;

    let reminder = match body.reminder {
        Some(patch) => patch.apply_to(existing.reminder.0),
        None => existing.reminder.0,
    };
    reminder.validate().map_err(AppError::Validation)?;

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        UPDATE habits SET
            title = $3,
            description = $4,
            icon = $5,
            color = $6,
            category = $7,
            frequency = $8,
            reminder = $9,
            is_archived = $10,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(habit_id)
    .bind(auth_user.id)
    .bind(body.title.map(|t| t.trim().to_string()).unwrap_or(existing.title))
    .bind(body.description.unwrap_or(existing.description))
    .bind(body.icon.unwrap_or(existing.icon))
    .bind(body.color.unwrap_or(existing.color))
    .bind(body.category.unwrap_or(existing.category))
    .bind(DbJson(&frequency))
    .bind(DbJson(&reminder))
    .bind(body.is_archived.unwrap_or(existing.is_archived))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("Habit not found".into()))?;

    tracing::debug!(user_id = %auth_user.id, habit_id = %habit.id, archived = habit.is_archived, "Habit updated");
    Ok(Json(habit.into()))
}

/// Hard delete; the habit's completions cascade.
pub async fn delete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(habit_id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM habits WHERE id = $1 AND user_id = $2")
        .bind(habit_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Habit not found".into()));
    }

    tracing::info!(user_id = %auth_user.id, habit_id = %habit_id, "Habit deleted");
    Ok(Json(json!({ "message": "Habit removed" })))
}
