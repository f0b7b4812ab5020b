pub mod dates;
pub mod moods;
pub mod stats;
pub mod streaks;
