use clap::{Args, Parser, Subcommand, ValueEnum};
use flashgate_core::CheckType;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreKind {
    Json,
    Sqlite,
}

/// Self-assessment buttons shared by study and simple review.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Mark {
    Know,
    DontKnow,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "flashgate", version, about = "Flashgate card scheduling CLI/API")]
pub struct Cli {
    /// Storage backend
    #[arg(long, value_enum, env = "FLASHGATE_STORE", default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    /// Store file (JSON image or SQLite DB); defaults to the app data dir
    #[arg(long, env = "FLASHGATE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Learner whose card states are read and written
    #[arg(long, env = "FLASHGATE_USER")]
    pub user: Option<Uuid>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Start tracking cards of a deck (idempotent)
    Track(TrackCmd),
    /// Drop all of a deck's card states and logs
    Untrack {
        #[arg(long)]
        deck: Uuid,
    },
    /// Study-mode self assessment
    Study {
        #[arg(value_enum)]
        mark: Mark,
        card: Uuid,
    },
    /// Print the check a card must pass next
    NextTest { card: Uuid },
    /// Record a primary-test result
    Test(TestCmd),
    /// Record a spaced-review result
    Review {
        card: Uuid,
        /// The answer was wrong
        #[arg(long)]
        failed: bool,
    },
    /// Flip-card review: know / don't know
    Simple {
        #[arg(value_enum)]
        mark: Mark,
        card: Uuid,
    },
    /// Dump a card's record as JSON
    Show { card: Uuid },
    /// Counts by status, due and testable
    Summary(SummaryCmd),
    /// Cards due for spaced review
    Due(QueueCmd),
    /// Cards ready for primary testing
    Testable(QueueCmd),
    /// Review log with accuracy and streak
    History {
        #[arg(long)]
        card: Option<Uuid>,
    },
    /// Launch Axum HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Args, Clone)]
pub struct TrackCmd {
    #[arg(long)]
    pub deck: Uuid,
    /// Card ids belonging to the deck
    #[arg(required = true)]
    pub cards: Vec<Uuid>,
}

#[derive(Debug, Args, Clone)]
pub struct TestCmd {
    pub card: Uuid,
    /// choice | audio | dictation
    pub check: CheckType,
    #[arg(long)]
    pub failed: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SummaryCmd {
    #[arg(long)]
    pub deck: Option<Uuid>,
    /// One line per deck instead of a single total
    #[arg(long)]
    pub per_deck: bool,
}

#[derive(Debug, Args, Clone)]
pub struct QueueCmd {
    #[arg(long)]
    pub deck: Option<Uuid>,
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, env = "FLASHGATE_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: String,
}
