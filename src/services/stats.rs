use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::completion::CompletedDay;
use crate::models::habit::Habit;
use crate::services::dates::DateRange;

const TOP_HABITS: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub overview: OverviewTotals,
    pub top_habits: Vec<TopHabit>,
    pub completion_data: Vec<DailyCompletion>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTotals {
    /// Percentage, rounded to a whole number.
    pub completion_rate: i64,
    pub current_streak: i32,
    pub best_streak: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopHabit {
    pub id: Uuid,
    pub title: String,
    pub icon: String,
    pub color: String,
    pub completion_rate: f64,
    pub streak: i32,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailyCompletion {
    pub date: NaiveDate,
    pub completed: i64,
    pub total: i64,
    pub rate: f64,
}

/// Aggregate completion statistics for `range`.
///
/// `habits` are the user's active habits in display order; that order breaks
/// ties in the top-habit ranking. Only completions of those habits count, so
/// with at most one record per (habit, day) every rate stays within bounds.
/// `current_streak` is the cross-habit streak computed by the caller.
pub fn compute_overview(
    habits: &[Habit],
    completions: &[CompletedDay],
    range: DateRange,
    current_streak: i32,
) -> StatsOverview {
    let active: HashSet<Uuid> = habits.iter().map(|h| h.id).collect();
    let in_scope: Vec<&CompletedDay> = completions
        .iter()
        .filter(|c| active.contains(&c.habit_id))
        .filter(|c| c.completed_on >= range.start && c.completed_on <= range.end)
        .collect();

    let days = range.days();
    let habit_count = habits.len() as i64;
    let total_possible = habit_count * days;

    let completion_rate = if total_possible > 0 {
        (in_scope.len() as f64 / total_possible as f64 * 100.0).round() as i64
    } else {
        0
    };

    let best_streak = habits
        .iter()
        .map(|h| h.streak_longest)
        .fold(current_streak, i32::max);

    let mut per_habit: HashMap<Uuid, i64> = HashMap::new();
    let mut per_day: HashMap<NaiveDate, HashSet<Uuid>> = HashMap::new();
    for c in &in_scope {
        *per_habit.entry(c.habit_id).or_default() += 1;
        per_day.entry(c.completed_on).or_default().insert(c.habit_id);
    }

    let mut top_habits: Vec<TopHabit> = habits
        .iter()
        .map(|h| {
            let done = per_habit.get(&h.id).copied().unwrap_or(0);
            TopHabit {
                id: h.id,
                title: h.title.clone(),
                icon: h.icon.clone(),
                color: h.color.clone(),
                completion_rate: if days > 0 {
                    done as f64 / days as f64 * 100.0
                } else {
                    0.0
                },
                streak: h.streak_current,
            }
        })
        .collect();
    // sort_by is stable: equal rates keep display order
    top_habits.sort_by(|a, b| {
        b.completion_rate
            .partial_cmp(&a.completion_rate)
            .unwrap_or(Ordering::Equal)
    });
    top_habits.truncate(TOP_HABITS);

    let completion_data = range
        .iter_days()
        .map(|date| {
            let completed = per_day.get(&date).map_or(0, |set| set.len() as i64);
            DailyCompletion {
                date,
                completed,
                total: habit_count,
                rate: if habit_count > 0 {
                    completed as f64 / habit_count as f64
                } else {
                    0.0
                },
            }
        })
        .collect();

    StatsOverview {
        overview: OverviewTotals {
            completion_rate,
            current_streak,
            best_streak,
        },
        top_habits,
        completion_data,
    }
}
