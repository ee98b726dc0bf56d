//! vaultsync command-line client
//!
//! Opens a session against the vault server, syncs the encrypted vault into
//! the local cache and decrypts individual fields on request.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vaultsync_core::sync::models::{Folder, Password, Share, Syncable};
use vaultsync_core::{
    get_default_config_path, ClientConfig, EntityType, FieldValue, MemoryPasswordStore,
    OpenOutcome, VaultClient,
};

/// End-to-end encrypted password vault client
#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(about = "Sync and read an end-to-end encrypted password vault", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server URL override
    #[arg(long)]
    server: Option<String>,

    /// User name override
    #[arg(short, long)]
    user: Option<String>,

    /// App token override
    #[arg(long, env = "VAULTSYNC_APP_TOKEN", hide_env_values = true)]
    app_token: Option<String>,

    /// Cache database override
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration and cache contents; with --check, open a session
    Status {
        #[arg(long)]
        check: bool,
    },

    /// Sync the vault into the local cache
    Sync {
        /// Only sync this entity type (password, folder, share)
        #[arg(long = "type", value_parser = parse_entity_type)]
        entity_type: Option<EntityType>,
    },

    /// List cached entities of one type
    List {
        #[arg(value_parser = parse_entity_type)]
        entity_type: EntityType,
    },

    /// Decrypt and print one field of a cached entity
    Show {
        #[arg(value_parser = parse_entity_type)]
        entity_type: EntityType,
        id: Uuid,
        field: String,
    },
}

fn parse_entity_type(value: &str) -> std::result::Result<EntityType, String> {
    EntityType::parse(value).ok_or_else(|| format!("unknown entity type {:?}", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(get_default_config_path);
    let mut config = ClientConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    debug!("Loaded configuration from {}", config_path.display());
    if let Some(server) = cli.server {
        debug!("Server overridden on the command line");
        config.server_url = server;
    }
    if let Some(user) = cli.user {
        debug!("User overridden on the command line");
        config.username = user;
    }
    if let Some(token) = cli.app_token {
        debug!("App token taken from the command line or environment");
        config.app_token = token;
    }
    if let Some(cache) = cli.cache {
        debug!("Cache overridden: {}", cache.display());
        config.cache_path = cache;
    }

    let client = VaultClient::from_config(&config, Arc::new(MemoryPasswordStore::new()))?;

    match cli.command {
        Commands::Status { check } => {
            println!("Server:  {}", config.server_url);
            println!("User:    {}", config.username);
            println!("Cache:   {}", config.cache_path.display());
            for entity_type in EntityType::ALL {
                let count = match entity_type {
                    EntityType::Password => client.list::<Password>()?.len(),
                    EntityType::Folder => client.list::<Folder>()?.len(),
                    EntityType::Share => client.list::<Share>()?.len(),
                };
                println!("{:<8} {}", format!("{}s:", entity_type), count);
            }
            if check {
                open(&client).await?;
            }
            println!("Session: {}", client.current_session_state());
        }
        Commands::Sync { entity_type } => {
            open(&client).await?;
            let result = match entity_type {
                Some(entity_type) => client.trigger_sync(entity_type).await.map(|r| vec![r]),
                None => client.sync_all().await,
            };
            let reports = match result {
                Ok(reports) => reports,
                Err(e) if e.is_transient() => {
                    bail!("Sync failed: {}; the server may be unreachable, try again later", e)
                }
                Err(e) => return Err(e.into()),
            };
            for report in reports {
                if !report.changed() {
                    println!("{:<8} up to date", report.entity_type.as_str());
                    continue;
                }
                println!(
                    "{:<8} +{} -{} ={} ({} ms)",
                    report.entity_type.as_str(),
                    report.upserted,
                    report.deleted,
                    report.unchanged,
                    report.duration.as_millis()
                );
            }
        }
        Commands::List { entity_type } => {
            let ids = match entity_type {
                EntityType::Password => ids(client.list::<Password>()?),
                EntityType::Folder => ids(client.list::<Folder>()?),
                EntityType::Share => ids(client.list::<Share>()?),
            };
            if entity_type == EntityType::Share {
                for id in ids {
                    println!("{}", id);
                }
            } else {
                open(&client).await?;
                let labels = client.decrypt_batch(entity_type, &ids, "label").await;
                for id in ids {
                    let label = match labels.get(&id) {
                        Some(Ok(value)) => display(value),
                        Some(Err(e)) => format!("<{}>", e),
                        None => String::new(),
                    };
                    println!("{}  {}", id, label);
                }
            }
        }
        Commands::Show {
            entity_type,
            id,
            field,
        } => {
            open(&client).await?;
            let value = client.decrypt_visible_field(entity_type, id, &field).await?;
            println!("{}", display(&value));
        }
    }

    client.session().close().await;
    Ok(())
}

/// Open a session, prompting for the master password when the server asks for it.
async fn open(client: &VaultClient) -> Result<()> {
    let mut outcome = client.open_session(None).await;
    for _ in 0..3 {
        match outcome {
            OpenOutcome::Opened => return Ok(()),
            OpenOutcome::NeedsMasterKey | OpenOutcome::InvalidMasterKey => {
                if outcome == OpenOutcome::InvalidMasterKey {
                    eprintln!("Wrong master password");
                }
                let password = rpassword::prompt_password("Master password: ")?;
                outcome = client.open_session(Some(SecretString::from(password))).await;
            }
            OpenOutcome::Deauthorized => {
                bail!("This client is no longer authorized; create a new app token and log in again")
            }
            OpenOutcome::Failed(e) => return Err(e.into()),
        }
    }
    outcome.into_result()?;
    Ok(())
}

fn ids<T: Syncable>(items: Vec<T>) -> Vec<Uuid> {
    items.iter().map(Syncable::id).collect()
}

fn display(value: &FieldValue) -> String {
    match value {
        FieldValue::Plain(text) => text.to_string(),
        FieldValue::AwaitingKeychain => "<locked>".to_string(),
    }
}
