use axum::{extract::State, Extension, Json};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::extract::{AppPath, AppQuery, OptionalJson};
use crate::models::completion::{
    CompleteResponse, Completion, CompletionRequest, CompletionWithHabit, CompletionWithHabitRow,
    DateRangeQuery, UncompleteResponse,
};
use crate::models::habit::Habit;
use crate::services::dates::{parse_day, previous_day, today, DateRange};
use crate::services::streaks::Streak;
use crate::AppState;

const NOT_YOUR_HABIT: &str = "Not authorized to modify this habit";

/// Lock the habit row for the rest of the transaction and check ownership.
async fn lock_habit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    habit_id: Uuid,
    user_id: Uuid,
) -> AppResult<Habit> {
    let habit = sqlx::query_as::<_, Habit>("SELECT * FROM habits WHERE id = $1 FOR UPDATE")
        .bind(habit_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Habit not found".into()))?;

    if habit.user_id != user_id {
        return Err(AppError::NotAuthorized(NOT_YOUR_HABIT.into()));
    }
    Ok(habit)
}

async fn save_streak(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    habit_id: Uuid,
    streak: Streak,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE habits
        SET streak_current = $2, streak_longest = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(habit_id)
    .bind(streak.current)
    .bind(streak.longest)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Mark a habit done for one day and advance its streak.
///
/// The streak only looks one day back: if the previous day is completed the
/// current streak grows by one, otherwise it restarts at one.
pub async fn complete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(habit_id): AppPath<Uuid>,
    OptionalJson(body): OptionalJson<CompletionRequest>,
) -> AppResult<Json<CompleteResponse>> {
    let day = body.date.unwrap_or_else(today);

    let mut tx = state.db.begin().await?;
    let habit = lock_habit(&mut tx, habit_id, auth_user.id).await?;

    let completion = sqlx::query_as::<_, Completion>(
        r#"
        INSERT INTO habit_completions (id, habit_id, user_id, completed_on, completed, note)
        VALUES ($1, $2, $3, $4, true, COALESCE($5, ''))
        ON CONFLICT (habit_id, completed_on) DO UPDATE SET
            completed = true,
            note = COALESCE($5, habit_completions.note),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(habit.id)
    .bind(habit.user_id)
    .bind(day)
    .bind(body.note())
    .fetch_one(&mut *tx)
    .await?;

    let previous_day_completed = match previous_day(day) {
        Some(prev) => {
            sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM habit_completions
                    WHERE habit_id = $1 AND completed_on = $2 AND completed = true
                )
                "#,
            )
            .bind(habit.id)
            .bind(prev)
            .fetch_one(&mut *tx)
            .await?
        }
        None => false,
    };

    let streak = habit.streak().after_completion(previous_day_completed);
    save_streak(&mut tx, habit.id, streak).await?;
    tx.commit().await?;

    tracing::info!(
        user_id = %auth_user.id,
        habit_id = %habit.id,
        day = %day,
        current = streak.current,
        longest = streak.longest,
        "Habit completed"
    );

    Ok(Json(CompleteResponse { completion, streak }))
}

/// Undo a completion. With a note the record is kept but flagged not
/// completed; without one it is deleted. Either way the current streak drops
/// to zero. When there is nothing to undo the habit is left untouched.
pub async fn uncomplete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(habit_id): AppPath<Uuid>,
    OptionalJson(body): OptionalJson<CompletionRequest>,
) -> AppResult<Json<UncompleteResponse>> {
    let day = body.date.unwrap_or_else(today);

    let mut tx = state.db.begin().await?;
    let habit = lock_habit(&mut tx, habit_id, auth_user.id).await?;

    let (completion, found) = match body.note() {
        Some(note) => {
            let kept = sqlx::query_as::<_, Completion>(
                r#"
                UPDATE habit_completions
                SET completed = false, note = $3, updated_at = NOW()
                WHERE habit_id = $1 AND completed_on = $2
                RETURNING *
                "#,
            )
            .bind(habit.id)
            .bind(day)
            .bind(note)
            .fetch_optional(&mut *tx)
            .await?;
            let found = kept.is_some();
            (kept, found)
        }
        None => {
            let deleted = sqlx::query(
                "DELETE FROM habit_completions WHERE habit_id = $1 AND completed_on = $2",
            )
            .bind(habit.id)
            .bind(day)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            (None, deleted > 0)
        }
    };

    if !found {
        tx.rollback().await?;
        return Ok(Json(UncompleteResponse {
            message: "No completion recorded for this day".into(),
            completion: None,
            streak: habit.streak(),
        }));
    }

    let streak = habit.streak().after_uncompletion();
    save_streak(&mut tx, habit.id, streak).await?;
    tx.commit().await?;

    tracing::info!(user_id = %auth_user.id, habit_id = %habit.id, day = %day, "Habit uncompleted");

    Ok(Json(UncompleteResponse {
        message: "Habit unmarked".into(),
        completion,
        streak,
    }))
}

/// Completion records of one habit, newest first. Both bounds are optional.
pub async fn habit_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(habit_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<DateRangeQuery>,
) -> AppResult<Json<Vec<Completion>>> {
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        DateRange::new(start, end)?;
    }

    let owner = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM habits WHERE id = $1")
        .bind(habit_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Habit not found".into()))?;

    if owner != auth_user.id {
        return Err(AppError::NotAuthorized(
            "Not authorized to view this habit".into(),
        ));
    }

    let completions = sqlx::query_as::<_, Completion>(
        r#"
        SELECT * FROM habit_completions
        WHERE habit_id = $1
          AND ($2::date IS NULL OR completed_on >= $2)
          AND ($3::date IS NULL OR completed_on <= $3)
        ORDER BY completed_on DESC
        "#,
    )
    .bind(habit_id)
    .bind(query.start_date)
    .bind(query.end_date)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(completions))
}

/// Every completion record of the caller on one day, with habit badge data.
pub async fn completions_by_date(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppPath(raw_date): AppPath<String>,
) -> AppResult<Json<Vec<CompletionWithHabit>>> {
    let day = parse_day(&raw_date)?;

    let rows = sqlx::query_as::<_, CompletionWithHabitRow>(
        r#"
        SELECT c.*,
               h.title AS habit_title,
               h.icon AS habit_icon,
               h.color AS habit_color
        FROM habit_completions c
        JOIN habits h ON h.id = c.habit_id
        WHERE c.user_id = $1 AND c.completed_on = $2
        ORDER BY h.created_at ASC
        "#,
    )
    .bind(auth_user.id)
    .bind(day)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(CompletionWithHabit::from).collect()))
}
