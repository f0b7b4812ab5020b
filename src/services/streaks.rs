use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-habit streak counters as stored on the habit row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub current: i32,
    pub longest: i32,
}

impl Streak {
    /// Single-step update after a day is marked complete: only the calendar
    /// day immediately before the completed one is consulted. Completing a
    /// past day does not re-chain the days after it.
    pub fn after_completion(self, previous_day_completed: bool) -> Self {
        let current = if previous_day_completed {
            self.current + 1
        } else {
            1
        };
        Self {
            current,
            longest: self.longest.max(current),
        }
    }

    /// Unmarking any day zeroes the live streak; the longest run is kept.
    pub fn after_uncompletion(self) -> Self {
        Self {
            current: 0,
            longest: self.longest,
        }
    }
}

/// Cross-habit streak: consecutive days ending at `today` on which at least
/// one habit was completed. A day without any completion, `today` included,
/// ends the walk.
///
/// `completed_days` comes from a single query over the user's history, so the
/// walk costs no extra round trips.
pub fn current_streak_from_days<I>(completed_days: I, today: NaiveDate) -> i32
where
    I: IntoIterator<Item = NaiveDate>,
{
    let days: BTreeSet<NaiveDate> = completed_days.into_iter().filter(|d| *d <= today).collect();

    let mut streak = 0;
    let mut check = Some(today);
    while let Some(day) = check {
        if !days.contains(&day) {
            break;
        }
        streak += 1;
        check = day.pred_opt();
    }
    streak
}
