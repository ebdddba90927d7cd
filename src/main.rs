// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use clap::Subcommand;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

mod auth;
mod catalog;
mod config;
mod database;
mod error;
mod import;
mod pagination;
mod recipes;
mod relations;
mod server;
mod shopping_list;
mod users;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug)]
struct Args {
    /// SQLite database to use instead of the configured one.
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the JSON API.
    Serve,
    /// Load ingredients from a JSON array of `{name, measurement_unit}` records.
    ImportIngredients { path: PathBuf },
    /// Load tags from a JSON array of `{name, color, slug}` records.
    ImportTags { path: PathBuf },
}

/// This is where the database and other user-data lives on-disk. On Linux it should be like:
/// `~/.local/share/recipe_share/`
fn data_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("recipe_share");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

fn serve(config: config::Config, conn: database::Connection) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::start_server(config, database::Database::new(conn)))
}

fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;

    let args = Args::parse();
    let config = config::Config::load(args.database)?;
    if let Some(parent) = config.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut conn = database::establish_connection(&config.database)?;
    log::info!("using database {:?}", config.database);

    match args.commands {
        Commands::ImportIngredients { path } => {
            import::import_ingredients(&mut conn, path)?;
        }
        Commands::ImportTags { path } => {
            import::import_tags(&mut conn, path)?;
        }
        Commands::Serve => serve(config, conn)?,
    }
    Ok(())
}
