//! Agent Knowledge Server - shared knowledge store for multi-agent development.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_knowledge_server::config::{ConfigLoader, ServerConfig};
use agent_knowledge_server::display;
use agent_knowledge_server::server::KnowledgeServer;
use agent_knowledge_server::store::{EntryFilter, KnowledgeStore};

#[derive(Parser)]
#[command(
    name = "agent-knowledge-server",
    about = "Share knowledge between agents working on different features",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (defaults to ./.agent-knowledge.toml, then the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding config and `DB_PATH`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Host address to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
        /// Skip the startup banner.
        #[arg(long)]
        quiet: bool,
    },
    /// Print store health and counts.
    Stats,
    /// List features, most recently active first.
    Features,
    /// Show the latest entries.
    Show {
        /// Only entries for this feature.
        #[arg(short, long)]
        feature: Option<String>,
        /// Only entries from this agent.
        #[arg(short, long)]
        agent: Option<String>,
        /// Maximum number of entries.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_tracing(verbosity: u8, serving: bool) {
    let level = match verbosity {
        0 if serving => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<ServerConfig, String> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path.clone()),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load_with_env().map_err(|e| e.to_string())?;
    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { host, port, quiet } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if !quiet {
                display::print_banner(&config);
            }

            let server = KnowledgeServer::open(config)
                .await
                .map_err(|e| e.to_string())?;
            let cancel = server.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            server.run().await.map_err(|e| e.to_string())
        }
        Commands::Stats => {
            let store = open_store(&config).await?;
            display::print_health(&store.health().await);
            Ok(())
        }
        Commands::Features => {
            let store = open_store(&config).await?;
            let features = store.list_features().await.map_err(|e| e.to_string())?;
            display::print_features(&features);
            Ok(())
        }
        Commands::Show {
            feature,
            agent,
            limit,
        } => {
            let store = open_store(&config).await?;
            let filter = EntryFilter {
                feature,
                branch: None,
                agent,
            };
            let entries = store
                .query(&filter, limit)
                .await
                .map_err(|e| e.to_string())?;
            display::print_entries(&entries);
            Ok(())
        }
    }
}

async fn open_store(config: &ServerConfig) -> Result<KnowledgeStore, String> {
    KnowledgeStore::open(&config.store_config())
        .await
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, matches!(cli.command, Commands::Serve { .. }));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            display::print_error(&message);
            ExitCode::FAILURE
        }
    }
}
