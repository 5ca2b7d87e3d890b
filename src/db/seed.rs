use serde_json::{json, Value};

use crate::models::Game;
use crate::services::normalize_games;

fn pick(id: &str, source: &str, market: &str, pick: &str, line: &str, confidence: f64, notes: &str, link: &str) -> Value {
    json!({
        "id": id,
        "source": source,
        "market": market,
        "pick": pick,
        "line": line,
        "confidence": confidence,
        "notes": notes,
        "link": link,
    })
}

/// Curated three-game slate used on first run and on "reset".
///
/// Ids are fixed: an unsaved slate is rebuilt by every CLI invocation, and the
/// ids it prints must still resolve in the next one.
pub fn sample_slate() -> Vec<Game> {
    let slate = vec![
        json!({
            "id": "sample-chiefs-eagles",
            "homeTeam": "Kansas City Chiefs",
            "awayTeam": "Philadelphia Eagles",
            "kickoff": "Mon • 8:15 PM ET",
            "location": "GEHA Field at Arrowhead Stadium",
            "tags": ["primetime", "AFC", "rematch"],
            "notes": "Mahomes vs Hurts rematch. Wind 12 mph, light rain expected. Chiefs off bye week.",
            "predictions": [
                pick("sample-chiefs-eagles-1", "PFF Forecast", "Spread", "Chiefs -2.5", "-110", 62.0,
                     "Trusting KC off a bye with defensive edge", "https://www.pff.com"),
                pick("sample-chiefs-eagles-2", "Action Network", "Moneyline", "Chiefs ML", "-140", 58.0,
                     "Model makes KC -3.2", "https://www.actionnetwork.com"),
                pick("sample-chiefs-eagles-3", "Sharp Clark", "Total", "Under 47.5", "-110", 70.0,
                     "Both defenses top-5 in EPA over last month", "https://www.sharpclark.com"),
                pick("sample-chiefs-eagles-4", "Ringer Gambling Show", "Spread", "Eagles +2.5", "-105", 55.0,
                     "Hurts legs can keep them in it late", "https://www.theringer.com"),
            ],
        }),
        json!({
            "id": "sample-49ers-cowboys",
            "homeTeam": "San Francisco 49ers",
            "awayTeam": "Dallas Cowboys",
            "kickoff": "Sun • 4:25 PM ET",
            "location": "Levi's Stadium",
            "tags": ["NFC", "game-of-the-week"],
            "notes": "Cowboys on short rest after MNF. 49ers pass rush vs DAL OL injuries.",
            "predictions": [
                pick("sample-49ers-cowboys-1", "The Athletic Beat", "Spread", "49ers -3.5", "-115", 68.0,
                     "Shanahan scripted plays vs DAL man coverage", "https://www.theathletic.com"),
                pick("sample-49ers-cowboys-2", "ESPN Analytics", "Moneyline", "49ers ML", "-175", 72.0,
                     "FPI gives SF 67% win probability", "https://www.espn.com"),
                pick("sample-49ers-cowboys-3", "Warren Sharp", "Total", "Over 46.5", "-110", 64.0,
                     "Expect explosives vs aggressive defenses", "https://www.sharpfootballanalysis.com"),
                pick("sample-49ers-cowboys-4", "RotoGrinders Betting", "Team Total", "49ers team total over 24.5", "-115", 61.0,
                     "Dallas defensive splits dip outdoors; SF offense rolling", "https://rotogrinders.com"),
            ],
        }),
        json!({
            "id": "sample-ravens-dolphins",
            "homeTeam": "Baltimore Ravens",
            "awayTeam": "Miami Dolphins",
            "kickoff": "Sun • 1:00 PM ET",
            "location": "M&T Bank Stadium",
            "tags": ["AFC", "weather watch"],
            "notes": "Forecast calling for breezy conditions. Monitor OL injuries for Miami.",
            "predictions": [
                pick("sample-ravens-dolphins-1", "BettingPros Consensus", "Spread", "Ravens -3", "-115", 60.0,
                     "Market shading toward Baltimore with injury concerns for Dolphins OL", "https://www.bettingpros.com"),
                pick("sample-ravens-dolphins-2", "Establish The Run", "Player Prop", "Lamar Jackson over 58.5 rush yds", "-120", 74.0,
                     "Miami man coverage opens rushing lanes for QB scrambles", "https://establishtherun.com"),
                pick("sample-ravens-dolphins-3", "The Lines Podcast", "Moneyline", "Ravens ML", "-160", 65.0,
                     "Trusting Harbaugh off mini-bye with rest advantage", "https://www.thelines.com"),
                pick("sample-ravens-dolphins-4", "VEGAS Insider", "Total", "Over 49.5", "-108", 52.0,
                     "Projected pace increase with explosive playmakers on both sides", "https://www.vegasinsider.com"),
            ],
        }),
    ];

    normalize_games(&slate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregator::{board_stats, consensus_leaders, market_breakdown};

    #[test]
    fn test_sample_slate_shape() {
        let games = sample_slate();
        assert_eq!(games.len(), 3);
        assert!(games.iter().all(|g| g.predictions.len() == 4));

        let stats = board_stats(&games);
        assert_eq!(stats.picks_logged, 12);
        assert_eq!(stats.high_confidence, 3); // 70, 72, 74
    }

    #[test]
    fn test_sample_slate_summaries() {
        let games = sample_slate();
        // Every pick is unique within its game, so no consensus reaches 40%.
        assert!(consensus_leaders(&games).is_empty());

        let breakdown = market_breakdown(&games).unwrap();
        assert_eq!(breakdown[0].market, "Spread");
        assert_eq!(breakdown[0].count, 4);
        assert_eq!(breakdown[0].percent, 33);
    }

    #[test]
    fn test_sample_slate_ids_are_stable_and_unique() {
        let first = sample_slate();
        assert_eq!(first, sample_slate());
        assert_eq!(first[0].id, "sample-chiefs-eagles");
        assert_eq!(first[0].predictions[0].id, "sample-chiefs-eagles-1");

        let mut ids: Vec<&str> = first
            .iter()
            .flat_map(|game| std::iter::once(game.id.as_str()).chain(game.predictions.iter().map(|p| p.id.as_str())))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 15);
    }
}
