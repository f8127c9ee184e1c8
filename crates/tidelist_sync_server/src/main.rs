//! Tidelist sync server binary.
//!
//! # Commands
//!
//! - `serve` - Run the HTTP sync server
//! - `issue-token` - Issue a bearer token for an account

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tidelist_core::OwnerId;
use tidelist_sync_engine::EngineConfig;
use tidelist_sync_server::{AuthConfig, ServerConfig, TokenAuthority};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted when `--auth-secret` is not given.
const SECRET_ENV: &str = "TIDELIST_AUTH_SECRET";

/// Tidelist sync server.
#[derive(Parser)]
#[command(name = "tidelist-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP sync server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// Secret for token validation (defaults to $TIDELIST_AUTH_SECRET)
        #[arg(long)]
        auth_secret: Option<String>,

        /// Token lifetime in hours
        #[arg(long, default_value_t = 24)]
        token_expiry_hours: u64,

        /// Maximum number of changes per sync request
        #[arg(long, default_value_t = 500)]
        max_batch: usize,
    },

    /// Issue a bearer token for an account
    IssueToken {
        /// Account identifier to issue the token for
        owner: String,

        /// Secret for token signing (defaults to $TIDELIST_AUTH_SECRET)
        #[arg(long)]
        auth_secret: Option<String>,
    },
}

fn resolve_secret(arg: Option<String>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let secret = match arg {
        Some(secret) => secret,
        None => std::env::var(SECRET_ENV)
            .map_err(|_| format!("auth secret required: pass --auth-secret or set {SECRET_ENV}"))?,
    };
    Ok(secret.into_bytes())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            bind,
            auth_secret,
            token_expiry_hours,
            max_batch,
        } => {
            let secret = resolve_secret(auth_secret)?;
            let config = ServerConfig::new(bind, secret)
                .with_token_expiry(Duration::from_secs(token_expiry_hours * 3600))
                .with_engine(EngineConfig::default().with_max_batch(max_batch));
            tidelist_sync_server::serve(config).await?;
        }
        Commands::IssueToken { owner, auth_secret } => {
            let secret = resolve_secret(auth_secret)?;
            let authority = TokenAuthority::new(AuthConfig::new(secret));
            println!("{}", authority.issue(&OwnerId::new(owner)));
        }
    }

    Ok(())
}
