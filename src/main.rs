// Workshop Back-Office - operator CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use workshop_backoffice::auth::hash_token;
use workshop_backoffice::{import_products, load_product_csv, open_database, Config, RESOURCES};

#[derive(Parser, Debug)]
#[command(name = "workshop-backoffice", version, about = "Workshop back-office tools")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or upgrade the database schema
    Init,
    /// Import a product catalogue CSV (code,name,description,brand,appliance)
    ImportProducts {
        csv: PathBuf,
    },
    /// Print the SHA-256 digest of a token, for the config's `tokens` list
    HashToken {
        token: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .init();

    match cli.command {
        Command::Init => run_init(&config),
        Command::ImportProducts { csv } => run_import(&config, &csv),
        Command::HashToken { token } => {
            println!("{}", hash_token(&token));
            Ok(())
        }
    }
}

fn run_init(config: &Config) -> Result<()> {
    println!("🔧 Setting up database...");
    let _conn = open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    info!("schema ready at {}", config.database_path.display());

    println!("✓ Database ready: {}", config.database_path.display());
    println!("✓ {} resources available", RESOURCES.len());
    Ok(())
}

fn run_import(config: &Config, csv: &Path) -> Result<()> {
    println!("📦 Product Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let rows = load_product_csv(csv)?;
    println!("✓ Loaded {} products from {}", rows.len(), csv.display());

    println!("\n💾 Importing products...");
    let mut conn = open_database(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    let summary = import_products(&mut conn, &rows).context("Product import failed")?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Inserted: {}", summary.inserted);
    println!("✅ Updated:  {}", summary.updated);
    Ok(())
}
