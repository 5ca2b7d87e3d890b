use chrono::NaiveDate;

use crate::models::Game;
use crate::services::normalizer::{AWAY_PLACEHOLDER, HOME_PLACEHOLDER};

/// Share of `count` in `total` as a whole percent, rounded half away from zero.
pub fn round_percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((count as f64 / total as f64) * 100.0).round() as u32
}

/// "Away @ Home" label used across the board views
pub fn format_matchup(game: &Game) -> String {
    let away = if game.away_team.is_empty() { AWAY_PLACEHOLDER } else { game.away_team.as_str() };
    let home = if game.home_team.is_empty() { HOME_PLACEHOLDER } else { game.home_team.as_str() };
    format!("{} @ {}", away, home)
}

/// Download name for an export taken on `date`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("football-picks-{}.json", date.format("%Y-%m-%d"))
}

pub fn pluralize(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Split a comma separated tag list into trimmed, non-empty tags
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
