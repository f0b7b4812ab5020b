use axum::{extract::State, http::StatusCode, Extension, Json};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::completion::DateRangeQuery;
use crate::models::mood::{Mood, MoodCount, MoodRequest, MoodStats, UpdateMoodRequest, UpsertedMood};
use crate::services::dates::{parse_day, today, DateRange};
use crate::services::moods::summarize;
use crate::AppState;

fn check_range(query: &DateRangeQuery) -> AppResult<()> {
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        DateRange::new(start, end)?;
    }
    Ok(())
}

/// Load a mood by id, telling "missing" apart from "someone else's".
async fn find_mood_for(db: &sqlx::PgPool, mood_id: Uuid, user_id: Uuid) -> AppResult<Mood> {
    let mood = sqlx::query_as::<_, Mood>("SELECT * FROM moods WHERE id = $1")
        .bind(mood_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Mood not found".into()))?;

    if mood.user_id != user_id {
        return Err(AppError::NotAuthorized("Not authorized to modify this mood".into()));
    }
    Ok(mood)
}

pub async fn list_moods(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<DateRangeQuery>,
) -> AppResult<Json<Vec<Mood>>> {
    check_range(&query)?;

    let moods = sqlx::query_as::<_, Mood>(
        r#"
        SELECT * FROM moods
        WHERE user_id = $1
          AND ($2::date IS NULL OR mood_on >= $2)
          AND ($3::date IS NULL OR mood_on <= $3)
        ORDER BY mood_on DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(moods))
}

pub async fn mood_by_date(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(raw_date): AppPath<String>,
) -> AppResult<Json<Mood>> {
    let day = parse_day(&raw_date)?;

    let mood = sqlx::query_as::<_, Mood>("SELECT * FROM moods WHERE user_id = $1 AND mood_on = $2")
        .bind(auth_user.id)
        .bind(day)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("No mood recorded for this day".into()))?;

    Ok(Json(mood))
}

/// One mood per user and day. A second post for the same day overwrites the
/// stored entry in place: absent fields keep their stored values, and a new
/// entry without a mood starts as neutral. 201 on insert, 200 on overwrite.
pub async fn upsert_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<MoodRequest>,
) -> AppResult<(StatusCode, Json<Mood>)> {
    body.validate()?;
    let day = body.date.unwrap_or_else(today);

    let upserted = sqlx::query_as::<_, UpsertedMood>(
        r#"
        INSERT INTO moods (id, user_id, mood_on, mood, note)
        VALUES ($1, $2, $3, COALESCE($4, 'neutral'::mood_kind), COALESCE($5, ''))
        ON CONFLICT (user_id, mood_on) DO UPDATE SET
            mood = COALESCE($4, moods.mood),
            note = COALESCE($5, moods.note),
            updated_at = NOW()
        RETURNING *, (xmax = 0) AS inserted
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(day)
    .bind(body.mood)
    .bind(body.note.as_deref())
    .fetch_one(&state.db)
    .await?;

    let status = if upserted.inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    tracing::info!(
        user_id = %auth_user.id,
        day = %day,
        mood = ?upserted.mood.mood,
        inserted = upserted.inserted,
        "Mood recorded"
    );
    Ok((status, Json(upserted.mood)))
}

pub async fn update_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(mood_id): AppPath<Uuid>,
    AppJson(body): AppJson<UpdateMoodRequest>,
) -> AppResult<Json<Mood>> {
    body.validate()?;
    let existing = find_mood_for(&state.db, mood_id, auth_user.id).await?;

    let mood = sqlx::query_as::<_, Mood>(
        r#"
        UPDATE moods SET mood = $2, note = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(existing.id)
    .bind(body.mood.unwrap_or(existing.mood))
    .bind(body.note.unwrap_or(existing.note))
    .fetch_one(&state.db)
    .await?;

    Ok(Json(mood))
}

pub async fn delete_mood(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(mood_id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let existing = find_mood_for(&state.db, mood_id, auth_user.id).await?;

    sqlx::query("DELETE FROM moods WHERE id = $1")
        .bind(existing.id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %auth_user.id, mood_id = %existing.id, "Mood deleted");
    Ok(Json(json!({ "message": "Mood removed" })))
}

/// Per-category counts and the weighted average over the optional range.
pub async fn mood_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<DateRangeQuery>,
) -> AppResult<Json<MoodStats>> {
    check_range(&query)?;

    let counts = sqlx::query_as::<_, MoodCount>(
        r#"
        SELECT mood, COUNT(*) AS count FROM moods
        WHERE user_id = $1
          AND ($2::date IS NULL OR mood_on >= $2)
          AND ($3::date IS NULL OR mood_on <= $3)
        GROUP BY mood
        ORDER BY count DESC, mood ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(summarize(counts)))
}
