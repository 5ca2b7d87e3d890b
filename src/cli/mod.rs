use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;

use crate::db::{open_tracker, Settings};
use crate::models::{BoardSnapshot, GamePayload, GameView, PredictionPayload};
use crate::services::{filter_game, game_view, search_needle, snapshot, Applied};
use crate::utils::{format_matchup, pluralize};

fn report_warning<T>(applied: &Applied<T>) {
    if let Some(warning) = &applied.storage_warning {
        println!("⚠️  {}", warning);
    }
}

pub async fn show_board(settings: &Settings, search: Option<&str>) -> Result<()> {
    let tracker = open_tracker(settings).await?;
    let needle = search.map(search_needle).unwrap_or_default();

    print_snapshot(&snapshot(tracker.games()));

    let views: Vec<GameView> = tracker
        .games()
        .iter()
        .filter(|game| filter_game(game, &needle))
        .map(game_view)
        .collect();

    if views.is_empty() {
        if needle.is_empty() {
            println!("📭 No games on the board yet. Add one with: pickboard add-game --home <team> --away <team>");
        } else {
            println!("📭 No games match '{}'", needle);
        }
        return Ok(());
    }

    for view in &views {
        print_game(view);
    }
    Ok(())
}

pub async fn show_snapshot(settings: &Settings) -> Result<()> {
    let tracker = open_tracker(settings).await?;
    print_snapshot(&snapshot(tracker.games()));
    Ok(())
}

fn print_snapshot(snapshot: &BoardSnapshot) {
    println!("📊 Board Snapshot");
    println!("   Games Tracked: {}", snapshot.stats.games_tracked);
    println!("   Expert Picks Logged: {}", snapshot.stats.picks_logged);
    println!("   70%+ Confidence: {}", snapshot.stats.high_confidence);

    if let Some(breakdown) = &snapshot.market_breakdown {
        println!("\n🗂️  Market Coverage:");
        for share in breakdown {
            println!(
                "   {} {} - {} • {}%",
                share.icon,
                share.market,
                pluralize(share.count, "pick"),
                share.percent
            );
        }
    }

    if !snapshot.consensus_leaders.is_empty() {
        println!("\n🤝 Consensus Board (40%+ alignment):");
        for leader in &snapshot.consensus_leaders {
            println!("   {}% {}", leader.summary.percent, leader.summary.pick);
            println!(
                "      {} • {} of {} sources aligned",
                leader.matchup, leader.summary.count, leader.summary.total
            );
        }
    }

    if !snapshot.confidence_leaders.is_empty() {
        println!("\n🔥 Highest Confidence Board:");
        for leader in &snapshot.confidence_leaders {
            let odds = leader.line.as_deref().map_or(String::new(), |l| format!(" ({})", l));
            println!("   {}% {} {} {}", leader.confidence, leader.source, leader.icon, leader.market);
            println!("      {} • {}{}", leader.matchup, leader.pick, odds);
        }
    }
    println!();
}

fn print_game(view: &GameView) {
    let game = &view.game;
    let tags: String = game.tags.iter().take(4).map(|t| format!(" [{}]", t)).collect();
    println!("🏈 {}{}", format_matchup(game), tags);
    println!("   id: {}", game.id);

    let meta: Vec<String> = game
        .kickoff
        .iter()
        .map(|k| format!("Kickoff: {}", k))
        .chain(game.location.iter().cloned())
        .collect();
    if !meta.is_empty() {
        println!("   {}", meta.join(" | "));
    }

    if let Some(summary) = &view.consensus {
        println!(
            "   ✅ {} - {} of {} sources ({}%)",
            summary.pick, summary.count, summary.total, summary.percent
        );
    }
    if let Some(notes) = &game.notes {
        println!("   📝 {}", notes);
    }

    if view.markets.is_empty() {
        println!("   No picks yet. Add insights with: pickboard add-pick --game {}", game.id);
    }

    for group in &view.markets {
        println!(
            "\n   {} {} · {}",
            group.meta.icon,
            group.market,
            pluralize(group.predictions.len(), "pick")
        );
        if !group.meta.description.is_empty() {
            println!("     {}", group.meta.description);
        }
        let bar: Vec<String> = group
            .summary_bar
            .iter()
            .map(|segment| format!("{} ({})", segment.pick, segment.count))
            .collect();
        println!("     [{}]", bar.join(" | "));

        for prediction in &group.predictions {
            let line = prediction.line.as_deref().map_or(String::new(), |l| format!(" {}", l));
            let confidence = prediction
                .confidence
                .map_or(String::new(), |c| format!(" • {}% confidence", c));
            println!("     • {}: {}{}{}", prediction.source, prediction.pick, line, confidence);

            let extras: Vec<&str> = prediction
                .notes
                .as_deref()
                .into_iter()
                .chain(prediction.link.as_deref())
                .collect();
            if !extras.is_empty() {
                println!("       {}", extras.join(" · "));
            }
            println!("       id: {}", prediction.id);
        }
    }
    println!();
}

pub async fn add_game(settings: &Settings, payload: GamePayload) -> Result<()> {
    let mut tracker = open_tracker(settings).await?;
    let applied = tracker.save_game(payload).await?;
    report_warning(&applied);
    println!("✅ Saved {} (id: {})", format_matchup(&applied.value), applied.value.id);
    Ok(())
}

pub async fn delete_game(settings: &Settings, game_id: &str) -> Result<()> {
    let mut tracker = open_tracker(settings).await?;
    let applied = tracker.remove_game(game_id).await;
    report_warning(&applied);
    if applied.value {
        println!("🗑️  Deleted game {} and all associated picks", game_id);
    } else {
        println!("❌ No game with id {}", game_id);
    }
    Ok(())
}

pub async fn add_pick(settings: &Settings, game_id: &str, payload: PredictionPayload) -> Result<()> {
    let mut tracker = open_tracker(settings).await?;
    let applied = tracker.save_prediction(game_id, payload).await?;
    report_warning(&applied);
    println!(
        "✅ Saved pick '{}' from {} (id: {})",
        applied.value.pick, applied.value.source, applied.value.id
    );
    Ok(())
}

pub async fn delete_pick(settings: &Settings, game_id: &str, prediction_id: &str) -> Result<()> {
    let mut tracker = open_tracker(settings).await?;
    let applied = tracker.remove_prediction(game_id, prediction_id).await;
    report_warning(&applied);
    if applied.value {
        println!("🗑️  Deleted pick {}", prediction_id);
    } else {
        println!("❌ No pick {} on game {}", prediction_id, game_id);
    }
    Ok(())
}

pub async fn reset(settings: &Settings) -> Result<()> {
    let mut tracker = open_tracker(settings).await?;
    let applied = tracker.reset_to_sample().await;
    report_warning(&applied);
    println!("🔄 Board replaced with the curated sample slate ({} games)", applied.value);
    Ok(())
}

pub async fn export(settings: &Settings, out_dir: &Path) -> Result<PathBuf> {
    let tracker = open_tracker(settings).await?;
    let file = tracker.export(Utc::now().date_naive())?;

    tokio::fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(&file.file_name);
    tokio::fs::write(&path, file.contents).await?;

    println!("📦 Exported {} to {}", pluralize(tracker.games().len(), "game"), path.display());
    Ok(path)
}

pub async fn import(settings: &Settings, file: &Path) -> Result<()> {
    let mut tracker = open_tracker(settings).await?;
    match tracker.import(tokio::fs::read_to_string(file)).await {
        Ok(applied) => {
            report_warning(&applied);
            println!("📥 Imported {}", pluralize(applied.value, "game"));
            Ok(())
        }
        Err(e) => {
            tracing::error!("Import of {} failed: {}", file.display(), e);
            println!("❌ Could not import data. Please ensure the JSON file was exported from this tool.");
            Err(e.into())
        }
    }
}
