mod api;
mod cli;
mod db;
mod models;
mod services;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::db::{Settings, DEFAULT_DATABASE_URL, DEFAULT_STORAGE_KEY};
use crate::models::{GamePayload, PredictionPayload};
use crate::utils::parse_tags;

#[derive(Parser)]
#[command(name = "pickboard")]
#[command(about = "Track expert football picks and see where the consensus lands")]
struct Cli {
    /// Database holding the saved board
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    database_url: String,

    /// Key the board is stored under
    #[arg(long, env = "PICKBOARD_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY, global = true)]
    storage_key: String,

    /// Keep the board in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Print the snapshot and every game card
    Board {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Print board-wide stats and leaderboards
    Snapshot,
    /// Create a game, or edit one when --id matches
    AddGame(GameArgs),
    /// Delete a game and all of its picks
    DeleteGame {
        #[arg(long)]
        id: String,
    },
    /// Log a pick on a game, or edit one when --id matches
    AddPick(PickArgs),
    /// Delete a single pick
    DeletePick {
        #[arg(long)]
        game: String,
        #[arg(long)]
        id: String,
    },
    /// Replace the board with the sample slate
    Reset,
    /// Write the board to football-picks-<date>.json
    Export {
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Replace the board with a previously exported file
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Initialize the database
    InitDb,
}

impl Commands {
    /// Commands whose effect only exists once it is saved.
    fn changes_board(&self) -> bool {
        matches!(
            self,
            Commands::AddGame(_)
                | Commands::DeleteGame { .. }
                | Commands::AddPick(_)
                | Commands::DeletePick { .. }
                | Commands::Reset
                | Commands::Import { .. }
        )
    }
}

impl Cli {
    /// An in-memory board dies with the process, so one-shot edits against it would be lost.
    fn check_ephemeral(&self) -> Result<()> {
        if self.ephemeral && self.command.as_ref().map_or(false, Commands::changes_board) {
            anyhow::bail!("--ephemeral keeps the board in memory for this process only; use it with serve, board, snapshot or export");
        }
        Ok(())
    }
}

#[derive(Args)]
struct GameArgs {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    home: String,
    #[arg(long)]
    away: String,
    #[arg(long)]
    kickoff: Option<String>,
    #[arg(long)]
    location: Option<String>,
    /// Comma separated, e.g. "primetime, AFC"
    #[arg(long)]
    tags: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

impl From<GameArgs> for GamePayload {
    fn from(args: GameArgs) -> Self {
        GamePayload {
            id: args.id,
            home_team: args.home,
            away_team: args.away,
            kickoff: args.kickoff,
            location: args.location,
            tags: args.tags.as_deref().map(parse_tags).unwrap_or_default(),
            notes: args.notes,
        }
    }
}

#[derive(Args)]
struct PickArgs {
    #[arg(long)]
    game: String,
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    source: String,
    #[arg(long)]
    pick: String,
    #[arg(long)]
    market: Option<String>,
    #[arg(long)]
    line: Option<String>,
    #[arg(long, conflicts_with = "clear_confidence")]
    confidence: Option<f64>,
    #[arg(long)]
    clear_confidence: bool,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    link: Option<String>,
}

impl PickArgs {
    fn into_parts(self) -> (String, PredictionPayload) {
        let confidence = match (self.confidence, self.clear_confidence) {
            (_, true) => Some(None),
            (Some(value), false) => Some(Some(value)),
            (None, false) => None,
        };
        let payload = PredictionPayload {
            id: self.id,
            source: self.source,
            market: self.market,
            pick: self.pick,
            line: self.line,
            confidence,
            notes: self.notes,
            link: self.link,
        };
        (self.game, payload)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    cli.check_ephemeral()?;
    let settings = Settings {
        database_url: cli.database_url,
        storage_key: cli.storage_key,
        ephemeral: cli.ephemeral,
    };

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting Pickboard API server on port {}", port);
            api::serve(port, &settings).await?;
        }
        Some(Commands::Board { search }) => {
            cli::show_board(&settings, search.as_deref()).await?;
        }
        Some(Commands::Snapshot) => {
            cli::show_snapshot(&settings).await?;
        }
        Some(Commands::AddGame(args)) => {
            cli::add_game(&settings, args.into()).await?;
        }
        Some(Commands::DeleteGame { id }) => {
            cli::delete_game(&settings, &id).await?;
        }
        Some(Commands::AddPick(args)) => {
            let (game_id, payload) = args.into_parts();
            cli::add_pick(&settings, &game_id, payload).await?;
        }
        Some(Commands::DeletePick { game, id }) => {
            cli::delete_pick(&settings, &game, &id).await?;
        }
        Some(Commands::Reset) => {
            cli::reset(&settings).await?;
        }
        Some(Commands::Export { out_dir }) => {
            cli::export(&settings, &out_dir).await?;
        }
        Some(Commands::Import { file }) => {
            cli::import(&settings, &file).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            db::init_database(&settings.database_url).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting Pickboard API server on port 3000");
            api::serve(3000, &settings).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_game_args_become_payload() {
        let cli = Cli::parse_from([
            "pickboard", "add-game", "--home", "Bills", "--away", "Jets", "--tags", "AFC, , primetime",
        ]);
        let Some(Commands::AddGame(args)) = cli.command else {
            panic!("expected add-game");
        };
        let payload: GamePayload = args.into();
        assert_eq!(payload.home_team, "Bills");
        assert_eq!(payload.tags, vec!["AFC".to_string(), "primetime".to_string()]);
        assert_eq!(payload.id, None);
    }

    #[test]
    fn test_clear_confidence_maps_to_explicit_null() {
        let cli = Cli::parse_from([
            "pickboard", "add-pick", "--game", "g1", "--id", "p1", "--source", "Desk", "--pick", "Bills -3",
            "--clear-confidence",
        ]);
        let Some(Commands::AddPick(args)) = cli.command else {
            panic!("expected add-pick");
        };
        let (game_id, payload) = args.into_parts();
        assert_eq!(game_id, "g1");
        assert_eq!(payload.confidence, Some(None));
        assert_eq!(payload.market, None);
    }

    #[test]
    fn test_ephemeral_is_refused_for_commands_that_change_the_board() {
        let cli = Cli::parse_from(["pickboard", "--ephemeral", "add-game", "--home", "Bills", "--away", "Jets"]);
        assert!(cli.check_ephemeral().is_err());

        let cli = Cli::parse_from(["pickboard", "reset", "--ephemeral"]);
        assert!(cli.check_ephemeral().is_err());

        for read_only in [vec!["pickboard", "--ephemeral", "serve"], vec!["pickboard", "--ephemeral", "board"]] {
            assert!(Cli::parse_from(read_only).check_ephemeral().is_ok());
        }
        assert!(Cli::parse_from(["pickboard", "--ephemeral"]).check_ephemeral().is_ok());
        assert!(Cli::parse_from(["pickboard", "reset"]).check_ephemeral().is_ok());
    }
}
