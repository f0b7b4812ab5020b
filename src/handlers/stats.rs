use axum::{extract::State, Extension, Json};
use chrono::NaiveDate;

use crate::auth::middleware::AuthUser;
use crate::error::AppResult;
use crate::extract::AppQuery;
use crate::models::completion::{CompletedDay, DateRangeQuery};
use crate::models::habit::Habit;
use crate::services::dates::{today, DateRange, DEFAULT_WINDOW_DAYS};
use crate::services::stats::{compute_overview, StatsOverview};
use crate::services::streaks::current_streak_from_days;
use crate::AppState;

/// Completion rate, streaks, top habits and a per-day series for the range.
/// Three queries regardless of range width or streak length.
pub async fn stats_overview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppQuery(query): AppQuery<DateRangeQuery>,
) -> AppResult<Json<StatsOverview>> {
    let today = today();
    let range = DateRange::resolve(query.start_date, query.end_date, today, DEFAULT_WINDOW_DAYS)?;

    let habits = sqlx::query_as::<_, Habit>(
        r#"
        SELECT * FROM habits
        WHERE user_id = $1 AND is_archived = false
        ORDER BY created_at ASC
        "#,
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    let completions = sqlx::query_as::<_, CompletedDay>(
        r#"
        SELECT habit_id, completed_on FROM habit_completions
        WHERE user_id = $1 AND completed = true
          AND completed_on BETWEEN $2 AND $3
        "#,
    )
    .bind(auth_user.id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(&state.db)
    .await?;

    let completed_days = sqlx::query_scalar::<_, NaiveDate>(
        r#"
        SELECT DISTINCT completed_on FROM habit_completions
        WHERE user_id = $1 AND completed = true AND completed_on <= $2
        ORDER BY completed_on DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(today)
    .fetch_all(&state.db)
    .await?;

    let current_streak = current_streak_from_days(completed_days, today);

    tracing::debug!(
        user_id = %auth_user.id,
        start = %range.start,
        end = %range.end,
        habits = habits.len(),
        completions = completions.len(),
        "Computing stats overview"
    );

    Ok(Json(compute_overview(&habits, &completions, range, current_streak)))
}
