use crate::models::mood::{MoodCount, MoodStats};

/// Totals and weighted average over per-category counts.
///
/// Counts come grouped from the database; they are re-sorted by count
/// descending (stable, so the query's tie order survives).
pub fn summarize(mut counts: Vec<MoodCount>) -> MoodStats {
    counts.retain(|c| c.count > 0);
    counts.sort_by(|a, b| b.count.cmp(&a.count));

    let total_moods: i64 = counts.iter().map(|c| c.count).sum();
    let weighted: i64 = counts.iter().map(|c| c.count * c.mood.weight()).sum();

    let average_mood = if total_moods > 0 {
        weighted as f64 / total_moods as f64
    } else {
        0.0
    };

    MoodStats {
        stats: counts,
        total_moods,
        average_mood,
    }
}
