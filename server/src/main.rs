//! Scroll Server binary

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scroll_server::config::Config;
use scroll_server::models::Role;
use scroll_server::storage::Storage;
use scroll_server::AppState;

/// Scroll Server CLI
#[derive(Parser)]
#[command(name = "scroll-server")]
#[command(about = "Realtime support chat server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user or support agent
    CreateUser {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long, value_enum, default_value_t = Role::User)]
        role: Role,
    },

    /// List registered users
    ListUsers,

    /// Run the server
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "scroll_server=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config).await?;
    let config = Arc::new(config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CreateUser { name, email, role } => {
            create_user(&config, &name, &email, role).await?;
        }
        Commands::ListUsers => {
            list_users(&config).await?;
        }
        Commands::Run => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn create_user(config: &Config, name: &str, email: &str, role: Role) -> anyhow::Result<()> {
    let storage = Storage::new(&config.storage.database_path).await?;
    let user = storage.create_user(name, email, role).await?;

    println!("Created {} {} <{}>", user.role, user.user_id, user.email);

    Ok(())
}

async fn list_users(config: &Config) -> anyhow::Result<()> {
    let storage = Storage::new(&config.storage.database_path).await?;
    let users = storage.list_users().await?;

    println!("=== Registered Users ===");
    for user in users {
        let last_seen = user
            .last_seen_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "User ID: {} | {} <{}> | Role: {} | Last seen: {}",
            user.user_id, user.name, user.email, user.role, last_seen
        );
    }

    Ok(())
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("Starting Scroll Server v{}", env!("CARGO_PKG_VERSION"));

    // Initialize storage
    let storage = Arc::new(Storage::new(&config.storage.database_path).await?);

    let state = AppState::new(config.clone(), storage);
    let app = scroll_server::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {} (realtime at {})", addr, config.server.ws_path);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
