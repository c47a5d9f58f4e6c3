use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use synack_auth::config::{default_config_path, ResolvedConfig};
use synack_auth::credentials::{CredentialStore, PromptingStore};
use synack_auth::duration::format_duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "synack-auth")]
#[command(about = "Log in to the Synack platform API without a browser")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a valid bearer token, logging in if the stored one has expired
    Login,
    /// Fetch and print a fresh notifications token
    NotificationsToken,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let config = ResolvedConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Command::Login => {
            let mut auth = authenticator(&config)?;
            let token = auth.obtain_bearer_token().await?;
            println!("{}", token.expose_secret());
        }
        Command::NotificationsToken => {
            let mut auth = authenticator(&config)?;
            auth.obtain_bearer_token().await?;
            let token = auth.obtain_notifications_token().await?;
            println!("{}", token.expose_secret());
        }
        Command::Config => {
            println!("Config file: {}", config_path.display());
            println!("Output directory: {}", config.config_dir.display());
            println!("Login: {}", config.endpoints.login_root());
            println!("Platform: {}", config.endpoints.platform_root());
            println!("Notifications: {}", config.endpoints.notifications_root());
            match &config.proxy {
                Some(proxy) => println!(
                    "Proxy: http={} https={} (TLS verification off)",
                    proxy.http.as_deref().unwrap_or("-"),
                    proxy.https.as_deref().unwrap_or("-")
                ),
                None => println!("Proxy: none"),
            }
            println!(
                "Retry: {} retries, {} rate-limit backoff",
                config.retry.max_retries,
                format_duration(config.retry.rate_limit_backoff)
            );
            println!(
                "MFA: {} polls every {}, stale code step {}",
                config.mfa.poll_attempts,
                format_duration(config.mfa.poll_interval),
                config.mfa.stale_code_step
            );
            println!("Credentials: {:?}", config.credentials);
        }
    }

    Ok(())
}

fn authenticator(config: &ResolvedConfig) -> Result<synack_auth::Authenticator> {
    let store = config.credential_store()?;
    let store: Arc<dyn CredentialStore> = Arc::new(PromptingStore::new(store));
    Ok(config.authenticator(store, None))
}
