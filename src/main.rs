use anyhow::Result;
use clap::Parser;

use liftflow::cli::{Cli, Commands};
use liftflow::commands;
use liftflow::db::open;
use liftflow::types::OutputFmt;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let fmt = if cli.json {
        OutputFmt::Json
    } else {
        OutputFmt::Plain
    };

    let pool = open("./liftflow.db").await?;

    match cli.cmd {
        Commands::Session(cmd) => commands::session::handle(cmd, &pool).await?,
        Commands::Plan(cmd) => commands::plan::handle(cmd, &pool, fmt).await?,
        Commands::History(cmd) => commands::history::handle(cmd, &pool, fmt).await?,
        Commands::Config(cmd) => commands::config::handle(cmd).await?,
    }

    Ok(())
}
