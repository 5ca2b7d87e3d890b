use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{
    BoardSnapshot, BoardStats, ConfidenceLeader, ConsensusLeader, ConsensusSummary, Game, GameView,
    MarketGroup, MarketShare, Prediction, SummarySegment,
};
use crate::services::market::{format_market_label, market_meta};
use crate::utils::{format_matchup, round_percent};

pub const CONSENSUS_THRESHOLD: u32 = 40;
pub const HIGH_CONFIDENCE: f64 = 70.0;
const CONSENSUS_LEADER_LIMIT: usize = 3;
const CONFIDENCE_LEADER_LIMIT: usize = 5;
const OTHER_PICK: &str = "Other";

/// Tallies keys in first-seen order.
struct Tally {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl Tally {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn add(&mut self, key: String) {
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    /// Entries by descending count; ties keep first-seen order.
    fn ranked(self) -> Vec<(String, usize)> {
        let mut entries = self.entries;
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

fn pick_key(prediction: &Prediction) -> String {
    let pick = prediction.pick.trim();
    if pick.is_empty() {
        OTHER_PICK.to_string()
    } else {
        pick.to_string()
    }
}

/// Plurality pick for a game's predictions, reported only at 40% agreement or above.
pub fn consensus_summary(predictions: &[Prediction]) -> Option<ConsensusSummary> {
    if predictions.is_empty() {
        return None;
    }

    let mut tally = Tally::new();
    for prediction in predictions {
        tally.add(pick_key(prediction));
    }

    let (pick, count) = tally.ranked().into_iter().next()?;
    let total = predictions.len();
    let percent = round_percent(count, total);
    if percent < CONSENSUS_THRESHOLD {
        return None;
    }

    Some(ConsensusSummary {
        pick,
        count,
        total,
        percent,
    })
}

/// Share of all logged picks per canonical market, busiest first.
pub fn market_breakdown(games: &[Game]) -> Option<Vec<MarketShare>> {
    let mut tally = Tally::new();
    let mut total = 0;
    for prediction in games.iter().flat_map(|game| &game.predictions) {
        total += 1;
        tally.add(format_market_label(Some(&prediction.market)));
    }

    if total == 0 {
        return None;
    }

    let shares = tally
        .ranked()
        .into_iter()
        .map(|(market, count)| MarketShare {
            icon: market_meta(Some(&market)).icon,
            percent: round_percent(count, total),
            market,
            count,
        })
        .collect();
    Some(shares)
}

/// Games with the strongest agreement, top three.
pub fn consensus_leaders(games: &[Game]) -> Vec<ConsensusLeader> {
    let mut leaders: Vec<ConsensusLeader> = games
        .iter()
        .filter_map(|game| {
            consensus_summary(&game.predictions).map(|summary| ConsensusLeader {
                game_id: game.id.clone(),
                matchup: format_matchup(game),
                summary,
            })
        })
        .collect();

    leaders.sort_by(|a, b| b.summary.percent.cmp(&a.summary.percent));
    leaders.truncate(CONSENSUS_LEADER_LIMIT);
    leaders
}

/// Highest confidence predictions across the board, top five.
pub fn confidence_leaders(games: &[Game]) -> Vec<ConfidenceLeader> {
    let mut entries: Vec<ConfidenceLeader> = Vec::new();
    for game in games {
        for prediction in &game.predictions {
            let Some(confidence) = prediction.confidence.filter(|c| c.is_finite()) else {
                continue;
            };
            entries.push(ConfidenceLeader {
                game_id: game.id.clone(),
                prediction_id: prediction.id.clone(),
                matchup: format_matchup(game),
                source: prediction.source.clone(),
                market: format_market_label(Some(&prediction.market)),
                icon: market_meta(Some(&prediction.market)).icon,
                pick: prediction.pick.clone(),
                line: prediction.line.clone(),
                confidence,
            });
        }
    }

    entries.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
    entries.truncate(CONFIDENCE_LEADER_LIMIT);
    entries
}

/// Pick counts inside one market group. Segment size is the raw count.
pub fn summary_bar(predictions: &[Prediction]) -> Vec<SummarySegment> {
    let mut tally = Tally::new();
    for prediction in predictions {
        tally.add(pick_key(prediction));
    }
    tally
        .ranked()
        .into_iter()
        .map(|(pick, count)| SummarySegment { pick, count })
        .collect()
}

fn display_confidence(prediction: &Prediction) -> f64 {
    prediction.confidence.unwrap_or(-1.0)
}

/// Partition predictions by canonical market in order of first appearance,
/// each group sorted by descending confidence with unrated picks last.
pub fn market_groups(predictions: &[Prediction]) -> Vec<MarketGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(String, Vec<Prediction>)> = Vec::new();

    for prediction in predictions {
        let label = format_market_label(Some(&prediction.market));
        match index.get(&label) {
            Some(&slot) => buckets[slot].1.push(prediction.clone()),
            None => {
                index.insert(label.clone(), buckets.len());
                buckets.push((label, vec![prediction.clone()]));
            }
        }
    }

    buckets
        .into_iter()
        .map(|(market, mut grouped)| {
            let summary_bar = summary_bar(&grouped);
            grouped.sort_by(|a, b| {
                display_confidence(b)
                    .partial_cmp(&display_confidence(a))
                    .unwrap_or(Ordering::Equal)
            });
            MarketGroup {
                meta: market_meta(Some(&market)),
                market,
                predictions: grouped,
                summary_bar,
            }
        })
        .collect()
}

/// Lowercase an incoming search string into a filter needle
pub fn search_needle(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// True when `needle` appears anywhere in the game's searchable text.
/// `needle` is expected to come from [`search_needle`].
pub fn filter_game(game: &Game, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }

    let mut fields: Vec<&str> = vec![game.home_team.as_str(), game.away_team.as_str()];
    fields.extend(game.location.as_deref());
    fields.extend(game.kickoff.as_deref());
    fields.extend(game.tags.iter().map(String::as_str));
    fields.extend(game.notes.as_deref());
    for prediction in &game.predictions {
        fields.push(&prediction.source);
        fields.push(&prediction.market);
        fields.push(&prediction.pick);
        fields.extend(prediction.notes.as_deref());
    }

    let haystack = fields
        .into_iter()
        .filter(|field| !field.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    haystack.contains(needle)
}

pub fn board_stats(games: &[Game]) -> BoardStats {
    let predictions = || games.iter().flat_map(|game| &game.predictions);
    BoardStats {
        games_tracked: games.len(),
        picks_logged: predictions().count(),
        high_confidence: predictions()
            .filter(|p| p.confidence.map_or(false, |c| c >= HIGH_CONFIDENCE))
            .count(),
    }
}

pub fn snapshot(games: &[Game]) -> BoardSnapshot {
    BoardSnapshot {
        stats: board_stats(games),
        market_breakdown: market_breakdown(games),
        consensus_leaders: consensus_leaders(games),
        confidence_leaders: confidence_leaders(games),
    }
}

pub fn game_view(game: &Game) -> GameView {
    GameView {
        consensus: consensus_summary(&game.predictions),
        markets: market_groups(&game.predictions),
        game: game.clone(),
    }
}
