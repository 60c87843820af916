use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "liftflow", version, about = "CLI workout runner")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Emit machine-readable JSON instead of colorful text.
    #[arg(global = true, long)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a workout session
    #[command(subcommand, visible_alias = "s")]
    Session(SessionCmd),

    /// Workout plan management
    #[command(subcommand, visible_alias = "p")]
    Plan(PlanCmd),

    /// Completed sessions and personal records
    #[command(subcommand, visible_alias = "h")]
    History(HistoryCmd),

    /// View or edit liftflow config
    #[command(subcommand)]
    Config(ConfigCmd),
}

//
// Commands
//

#[derive(Subcommand)]
pub enum SessionCmd {
    /// Start a live session for a plan - timers run, commands are typed at the prompt
    #[command(visible_alias = "s")]
    Start(StartArgs),
}

#[derive(Args)]
pub struct StartArgs {
    /// Plan index (from `p list`) or exact name
    pub plan: String,

    /// Display unit for weights (kg or lb); entered weights use it too
    #[arg(short, long)]
    pub unit: Option<String>,
}

#[derive(Subcommand)]
pub enum PlanCmd {
    /// Import one or more plans from TOML files
    #[command(visible_alias = "i")]
    Import { files: Vec<String> },

    /// List plans
    #[command(visible_alias = "l")]
    List,

    /// Show a single plan in detail
    #[command(visible_alias = "s")]
    Show {
        /// Plan index (from `p list`) or exact name
        plan: String,
    },

    /// Delete a plan
    #[command(visible_alias = "d")]
    Delete {
        /// Plan index (from `p list`) or exact name
        plan: String,
    },
}

#[derive(Subcommand)]
pub enum HistoryCmd {
    /// List completed sessions
    #[command(visible_alias = "l")]
    List {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Show the sessions logged on a specific date
    Show {
        /// Date in DD-MM-YYYY format
        #[arg(short, long)]
        date: String,
    },

    /// Show personal records
    Prs {
        /// Restrict to one exercise
        exercise: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Show all config keys
    List,

    /// Get the value of a key
    Get { key: String },

    /// Set or override a key (unit, default_rest_seconds, transition_seconds)
    Set { key: String, val: String },

    /// Remove a key
    Unset { key: String },
}
