//! CLI entry point that prepares a Neo4j database for Trellis.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use trellis_core::config::Settings;
use trellis_graph::{ConstraintManager, ConstraintOutcome, GraphClient, GraphStore};

#[derive(Parser)]
#[command(name = "trellis-bootstrap")]
#[command(about = "Create the Trellis database and declare its uniqueness constraints")]
struct Cli {
    /// Config file prefix (default: trellis).
    #[arg(short, long, default_value = "trellis")]
    config: String,

    /// Override the target database (otherwise read from config).
    #[arg(short, long)]
    database: Option<String>,

    /// Run `CREATE DATABASE IF NOT EXISTS` first. Requires an edition
    /// that supports multiple databases.
    #[arg(long)]
    create_database: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)?;
    if let Some(database) = cli.database {
        settings.neo4j.database = database;
    }

    let client = GraphClient::connect(&settings.neo4j).await?;
    let store: Arc<dyn GraphStore> = Arc::new(client);
    let constraints = ConstraintManager::new(store, settings.neo4j.database.as_str());

    if cli.create_database {
        constraints.create_database(constraints.database()).await?;
    }

    let outcomes = constraints.initialize_constraints().await?;
    let created = outcomes
        .iter()
        .filter(|(_, outcome)| *outcome == ConstraintOutcome::Created)
        .count();
    for (name, outcome) in &outcomes {
        tracing::info!(constraint = %name, ?outcome, "Constraint checked");
    }

    tracing::info!(
        database = %constraints.database(),
        created,
        existing = outcomes.len() - created,
        "Bootstrap complete"
    );
    Ok(())
}
