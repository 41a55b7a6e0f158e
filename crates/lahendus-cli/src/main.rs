//! Lahendus CLI
//!
//! Serves the HTTP API, or renders a UI page headlessly against it.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lahendus_cli::render_page;
use lahendus_core::{create_router, AppState, Config};
use lahendus_spa::PageOutcome;
use lahendus_wui::{Role, Session};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Lahendus - exercise management for programming courses
#[derive(Parser, Debug)]
#[command(name = "lahendus")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Path to configuration file (default: lahendus.json in current directory)
        #[arg(short, long, value_name = "FILE")]
        config: Option<String>,

        /// Port for the HTTP API server
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file, or :memory:
        #[arg(short, long, value_name = "FILE")]
        database: Option<String>,

        /// Insert the demo course if the database is empty
        #[arg(long)]
        seed: bool,
    },

    /// Render a UI page and print the resulting document
    Render {
        /// Page path, e.g. /courses/1/exercises
        #[arg(value_name = "PATH")]
        path: String,

        /// User to act as
        #[arg(short, long, default_value = "ago")]
        user: String,

        /// Role to act in: student, teacher or admin
        #[arg(short, long, default_value = "teacher")]
        role: Role,

        /// Path to configuration file (default: lahendus.json in current directory)
        #[arg(short, long, value_name = "FILE")]
        config: Option<String>,

        /// SQLite database file, or :memory:
        #[arg(short, long, value_name = "FILE")]
        database: Option<String>,

        /// Insert the demo course if the database is empty
        #[arg(long)]
        seed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Command::Serve {
            config,
            port,
            database,
            seed,
        } => serve(config.as_deref(), port, database, seed).await,
        Command::Render {
            path,
            user,
            role,
            config,
            database,
            seed,
        } => render(&path, Session::new(user, role), config.as_deref(), database, seed).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Runs the API server until it fails.
async fn serve(
    config_path: Option<&str>,
    port: Option<u16>,
    database: Option<String>,
    seed: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.port = port;
    }
    apply_database_overrides(&mut config, database, seed);
    config.validate()?;

    print_config(&config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = AppState::open(config).map_err(|e| {
        anyhow::anyhow!("Failed to open database: {e}\n\nSuggestion: Check the database path")
    })?;
    let router = create_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}/v2");
    tracing::info!(%addr, "Serving");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Renders one page and prints the document to stdout.
async fn render(
    path: &str,
    session: Session,
    config_path: Option<&str>,
    database: Option<String>,
    seed: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    apply_database_overrides(&mut config, database, seed);
    config.validate()?;

    let app_name = config.app_name.clone();
    let router = create_router(AppState::open(config)?);
    let page = render_page(router, session, &app_name, path)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing::info!(title = %page.title, outcome = ?page.outcome, "Rendered page");
    println!("{}", page.html);

    match page.outcome {
        PageOutcome::Broken(detail) => anyhow::bail!("Page failed to build: {detail}"),
        PageOutcome::NotFound => {
            anyhow::bail!("No page at '{path}'\n\nSuggestion: Try /courses/1/exercises")
        }
        PageOutcome::Built | PageOutcome::Abandoned => Ok(()),
    }
}

fn apply_database_overrides(config: &mut Config, database: Option<String>, seed: bool) {
    if let Some(database) = database {
        config.database = database;
    }
    if seed {
        config.seed_demo_data = true;
    }
}

/// Loads configuration from the given path or the default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Address: {}:{}", config.host, config.port);
    println!("  Database: {}", config.database);
    println!("  Demo data: {}", config.seed_demo_data);
    println!("  CORS allow all: {}", config.cors_allow_all);
}
