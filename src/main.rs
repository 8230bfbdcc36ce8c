use clap::{Parser, Subcommand};
use std::path::PathBuf;

use registro_solicitudes::config::Settings;
use registro_solicitudes::error::AppError;
use registro_solicitudes::server;

/// Registro de solicitudes: request approval workflow API.
#[derive(Parser, Debug)]
#[command(name = "registro", version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ./registro.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API until Ctrl-C
    Serve,

    /// Create a user account
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long)]
        password: String,

        /// Staff see every solicitud and may list revisiones
        #[arg(long)]
        staff: bool,

        /// May add revisiones and delete finalized solicitudes
        #[arg(long)]
        reviewer: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&settings.logging.filter, cli.verbose);

    if let Err(e) = run(cli.command, settings).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn init_tracing(filter: &str, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("registro_solicitudes=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(command: Commands, settings: Settings) -> Result<(), AppError> {
    match command {
        Commands::Serve => cmd_serve(settings).await,
        Commands::CreateUser {
            username,
            email,
            password,
            staff,
            reviewer,
        } => cmd_create_user(settings, &username, &email, &password, staff, reviewer).await,
    }
}

async fn cmd_serve(settings: Settings) -> Result<(), AppError> {
    let state = server::bootstrap(&settings).await?;
    let handle = server::start_server(&settings, state).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("[server] Failed to listen for Ctrl-C: {}", e);
    }

    handle.shutdown().await;
    Ok(())
}

async fn cmd_create_user(
    settings: Settings,
    username: &str,
    email: &str,
    password: &str,
    staff: bool,
    reviewer: bool,
) -> Result<(), AppError> {
    let state = server::bootstrap(&settings).await?;
    let user = server::create_user(&state, username, email, password, staff, reviewer).await?;

    println!("Created user {} (id {})", user.username, user.id);
    Ok(())
}
