use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dispute_core::{
    batch::OutputPaths, DisputeConfig, DisputeStore, GenerativeQueryAgent, StoreError,
};
use sqlx::PgPool;
use tracing_subscriber::{fmt, EnvFilter};

use dispute_pipeline::subsystems::{ask, bootstrap, classify, export, load, status};

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify and enrich financial disputes", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "dispute.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a CSV batch and write the classification and resolution files
    Classify {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Classify a CSV batch and store the enriched rows
    Load {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Write the stored disputes out as the two output files
    Export {
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Change a dispute's status (OPEN, IN_REVIEW, RESOLVED, CLOSED)
    Status { dispute_id: String, status: String },
    /// Print a dispute and its status history as JSON
    Show { dispute_id: String },
    /// Ask a question about the stored disputes
    Ask { question: String },
    /// Check database connectivity
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match DisputeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let default_level = config
        .service
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    match args.command {
        Command::Classify { input, out_dir } => {
            let orchestrator = startup(bootstrap::build_orchestrator(&config));
            let outputs = OutputPaths::in_dir(&out_dir, &config.output);
            let summary = classify::classify_file(&orchestrator, &input, &outputs).await?;
            println!(
                "Classified {} disputes ({} explanation / {} justification fallbacks)",
                summary.rows, summary.explanation_fallbacks, summary.justification_fallbacks
            );
            println!("  {}", outputs.classification.display());
            println!("  {}", outputs.resolution.display());
        }
        Command::Load { input } => {
            let orchestrator = startup(bootstrap::build_orchestrator(&config));
            let store = DisputeStore::new(connect(&config).await);
            let summary = load::load_file(&orchestrator, &store, &input).await?;
            println!(
                "Loaded {} disputes ({} new, {} already stored)",
                summary.batch.rows,
                summary.inserted,
                summary.batch.rows as u64 - summary.inserted
            );
        }
        Command::Export { out_dir } => {
            let store = DisputeStore::new(connect(&config).await);
            let outputs = OutputPaths::in_dir(&out_dir, &config.output);
            let rows = export::export_store(&store, &outputs).await?;
            println!("Exported {rows} disputes");
        }
        Command::Status {
            dispute_id,
            status: new_status,
        } => {
            let store = DisputeStore::new(connect(&config).await);
            match status::set_status(&store, &dispute_id, &new_status).await {
                Ok(change) => println!(
                    "Dispute {} status: {} -> {}",
                    change.dispute_id,
                    change.old_value.as_deref().unwrap_or("-"),
                    change.new_value.as_deref().unwrap_or("-")
                ),
                Err(e @ (StoreError::NotFound { .. } | StoreError::InvalidStatus(_))) => {
                    eprintln!("{e}");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Show { dispute_id } => {
            let store = DisputeStore::new(connect(&config).await);
            match status::show_dispute(&store, &dispute_id).await {
                Ok(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
                Err(e @ StoreError::NotFound { .. }) => {
                    eprintln!("{e}");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Ask { question } => {
            let client = startup(bootstrap::create_generative_client(&config.generation));
            let agent = GenerativeQueryAgent::new(Arc::clone(&client))?;
            let store = DisputeStore::new(connect(&config).await);
            let answer = ask::ask(&store, &agent, &question).await?;
            println!("{answer}");
        }
        Command::Health => {
            let pool = connect(&config).await;
            match dispute_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            }
            match dispute_core::db::dispute_count(&pool).await {
                Ok(Some(n)) => println!("✅ disputes table: {} rows", n),
                Ok(None) => println!("⚠️  disputes table not created yet (run `load`)"),
                Err(e) => {
                    println!("❌ disputes table check failed: {}", e);
                    std::process::exit(1);
                }
            }
            println!("✅ Dispute DB health check passed");
        }
    }

    Ok(())
}

/// Unwrap a startup result or exit with the error.
fn startup<T>(result: Result<T, dispute_core::DisputeError>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Startup failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn connect(config: &DisputeConfig) -> PgPool {
    match dispute_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}
