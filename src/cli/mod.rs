//! Command-line interface.
//!
//! Without a subcommand the binary runs the server. Subcommands talk to a
//! running server or inspect local state:
//! - `status` - Check that the server answers
//! - `config check` - Validate the configuration file
//! - `sync pull <dataset>` - Load a dataset through the sync layer and print it
//! - `sync push <dataset> <file>` - Record a JSON file as a local edit and sync it
//! - `board <edit>` - Rearrange or extend the shared pipeline board

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::sync::pipeline::Deal;
use crate::sync::{
    self, Board, DropTarget, Envelope, FileCache, HttpRemote, Resource, Source, SyncHandle,
    SyncState,
};

#[derive(Parser, Debug)]
#[command(name = "superclient")]
#[command(author, version, about = "Auth, session and document sync backend for the superclient CRM", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "superclient.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Skip startup self-checks (for development only)
    #[arg(long)]
    pub skip_checks: bool,

    /// API URL to connect to (default: `[sync] api_url`)
    #[arg(long, env = "SUPERCLIENT_API_URL")]
    pub api_url: Option<String>,

    /// Session token for authenticated requests (default: `[sync] token`)
    #[arg(long, env = "SUPERCLIENT_TOKEN")]
    pub token: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the server is up
    Status,

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Document sync commands
    #[command(subcommand)]
    Sync(SyncCommands),

    /// Pipeline board edits
    #[command(subcommand)]
    Board(BoardCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Load a dataset (server first, local cache as fallback) and print it
    Pull {
        #[arg(value_enum)]
        dataset: Dataset,
    },
    /// Replace a dataset with the contents of a JSON file
    Push {
        #[arg(value_enum)]
        dataset: Dataset,
        /// JSON file holding the new value (bare or `{schemaVersion, payload}`)
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum BoardCommands {
    /// Drop a deal onto another deal, or at the end of a column with --column
    MoveDeal {
        deal: String,
        /// Deal whose position the moved deal takes
        target: String,
        /// Treat the target as a column id
        #[arg(long)]
        column: bool,
    },
    /// Move a column to the position of another column
    MoveColumn { column: String, over: String },
    /// Append an empty stage
    AddColumn,
    /// Append a deal to a column
    AddDeal {
        column: String,
        name: String,
        #[arg(long, default_value = "")]
        value: String,
        #[arg(long, default_value = "")]
        owner: String,
    },
}

impl BoardCommands {
    /// Apply the edit to `board`. Returns whether anything changed.
    fn apply(&self, board: &mut Board) -> bool {
        let millis = chrono::Utc::now().timestamp_millis();
        match self {
            BoardCommands::MoveDeal {
                deal,
                target,
                column,
            } => {
                let target = if *column {
                    DropTarget::Column(target)
                } else {
                    DropTarget::Deal(target)
                };
                board.move_deal(deal, target)
            }
            BoardCommands::MoveColumn { column, over } => board.move_column(column, over),
            BoardCommands::AddColumn => {
                let added = board.add_column(format!("col-{}", millis));
                println!("Added column {} ({})", added.title, added.id);
                true
            }
            BoardCommands::AddDeal {
                column,
                name,
                value,
                owner,
            } => board.add_deal(
                column,
                Deal {
                    id: format!("deal-{}", millis),
                    name: name.clone(),
                    value: value.clone(),
                    owner: owner.clone(),
                    link: None,
                    comments: None,
                },
            ),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dataset {
    Finance,
    Pipeline,
}

impl Dataset {
    pub fn resource(self) -> Resource {
        match self {
            Dataset::Finance => Resource::FinanceData,
            Dataset::Pipeline => Resource::PipelineBoard,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    ok: bool,
}

/// Settings a client command runs with after flags override the file
struct ClientSettings {
    api_url: String,
    token: Option<String>,
    config: Config,
}

impl ClientSettings {
    fn resolve(cli: &Cli) -> Result<Self> {
        let config = Config::load(&cli.config)?;
        let api_url = cli
            .api_url
            .clone()
            .unwrap_or_else(|| config.sync.api_url.clone());
        let token = cli.token.clone().or_else(|| config.sync.token.clone());
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            config,
        })
    }
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Status) => cmd_status(cli).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Sync(SyncCommands::Pull { dataset })) => cmd_sync_pull(cli, *dataset).await,
        Some(Commands::Sync(SyncCommands::Push { dataset, file })) => {
            cmd_sync_push(cli, *dataset, file).await
        }
        Some(Commands::Board(edit)) => cmd_board(cli, edit).await,
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let settings = ClientSettings::resolve(cli)?;
    let client = sync::remote::create_client(settings.token.as_deref())?;

    println!("Connecting to {}...", settings.api_url);

    let response = client
        .get(format!("{}/api/health", settings.api_url))
        .send()
        .await
        .context("Failed to connect to server. Is superclient running?")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Server returned error {}: {}", status, body);
    }

    let health: HealthResponse = response
        .json()
        .await
        .context("Failed to parse health response")?;

    println!();
    if health.ok {
        println!("[OK] Server is healthy");
    } else {
        println!("[!!] Server reported a problem");
    }

    if settings.token.is_some() {
        let me = client
            .get(format!("{}/api/auth/me", settings.api_url))
            .send()
            .await?;
        if me.status().is_success() {
            let body: serde_json::Value = me.json().await?;
            println!(
                "[OK] Signed in as {}",
                body["user"]["email"].as_str().unwrap_or("?")
            );
        } else {
            println!("[!!] Session token rejected ({})", me.status());
        }
    }

    println!();
    Ok(())
}

/// Validate configuration file
fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Address:      {}:{}", config.server.host, config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!(
                "  Mode:         {}",
                if config.server.production {
                    "Production"
                } else {
                    "Development"
                }
            );
            println!();
            println!("Auth:");
            println!("  Session TTL:  {} days", config.auth.session_ttl_days);
            println!("  Reset TTL:    {} minutes", config.auth.reset_ttl_minutes);
            println!("  Cookie:       {}", config.auth.cookie_name);
            println!(
                "  Argon2id:     {} KiB, {} iterations, {} lanes",
                config.auth.argon2.memory_kib,
                config.auth.argon2.iterations,
                config.auth.argon2.parallelism
            );
            println!();
            println!("Security:");
            println!(
                "  Rate Limiting: {}",
                if config.rate_limit.enabled {
                    "Enabled"
                } else {
                    "Disabled"
                }
            );
            println!("  CORS Origins: {}", config.cors.allowed_origins.join(", "));
            println!();

            let warnings = config_warnings(&config);
            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  [!] {}", warning);
                }
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            println!("Please check the configuration file syntax and try again.");
            anyhow::bail!("Invalid configuration file");
        }
    }
}

fn config_warnings(config: &Config) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.auth.expose_reset_token {
        warnings.push("Reset tokens are returned by forgot-password (auth.expose_reset_token)");
    }
    if !config.rate_limit.enabled {
        warnings.push("Rate limiting is disabled - login is open to brute force");
    }
    if config.server.production && config.auth.argon2.memory_kib < 19 * 1024 {
        warnings.push("Argon2id memory below 19 MiB is weak for production");
    }
    warnings
}

async fn cmd_sync_pull(cli: &Cli, dataset: Dataset) -> Result<()> {
    let settings = ClientSettings::resolve(cli)?;
    let remote = HttpRemote::new(&settings.api_url, settings.token.as_deref())?;
    let cache = FileCache::new(&settings.config.sync.cache_dir)?;

    let resource = dataset.resource();
    let loaded = sync::load(&remote, &cache, &resource, sync::migration_for(&resource)).await;

    let source = match loaded.source {
        Source::Remote => "server",
        Source::Cache => "local cache (server unreachable)",
        Source::Empty => "defaults (nothing stored)",
    };
    eprintln!(
        "Loaded {} schema v{} from {}",
        resource, loaded.envelope.schema_version, source
    );

    if dataset == Dataset::Pipeline {
        print_board_summary(&Board::from_payload(&loaded.envelope.payload));
    }

    println!("{}", serde_json::to_string_pretty(&loaded.envelope.payload)?);
    Ok(())
}

/// Read a dataset value from disk and bring it to the current schema
fn read_dataset_file(path: &Path, resource: &Resource) -> Result<Envelope> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let migrated = sync::upgrade(Envelope::from_value(value), sync::migration_for(resource));
    Ok(migrated.envelope)
}

fn print_board_summary(board: &Board) {
    for column in &board.columns {
        eprintln!("  {:16} {} deals", column.title, column.deals.len());
    }
    eprintln!("  {} deals in total", board.deal_count());
}

/// Record one edit through a sync handle and flush it before returning
async fn sync_edit(
    settings: &ClientSettings,
    resource: Resource,
    envelope: Envelope,
) -> Result<()> {
    let remote = Arc::new(HttpRemote::new(&settings.api_url, settings.token.as_deref())?);
    let cache = Arc::new(FileCache::new(&settings.config.sync.cache_dir)?);
    let handle = SyncHandle::spawn(
        remote,
        cache,
        resource.clone(),
        envelope.schema_version,
        settings.config.sync.debounce(),
    );
    let state = handle.subscribe();

    handle.mutate(envelope.payload).await?;
    handle.shutdown().await;

    let final_state = *state.borrow();
    if final_state == SyncState::Clean {
        println!("[OK] {} synced to {}", resource, settings.api_url);
        Ok(())
    } else {
        println!("[!!] {} saved to the local cache only", resource);
        anyhow::bail!("Server did not accept the update")
    }
}

async fn cmd_sync_push(cli: &Cli, dataset: Dataset, file: &Path) -> Result<()> {
    let settings = ClientSettings::resolve(cli)?;
    let resource = dataset.resource();
    let envelope = read_dataset_file(file, &resource)?;
    sync_edit(&settings, resource, envelope).await
}

async fn cmd_board(cli: &Cli, edit: &BoardCommands) -> Result<()> {
    let settings = ClientSettings::resolve(cli)?;
    let resource = Resource::PipelineBoard;
    let migration = sync::migration_for(&resource);

    let remote = HttpRemote::new(&settings.api_url, settings.token.as_deref())?;
    let cache = FileCache::new(&settings.config.sync.cache_dir)?;
    let loaded = sync::load(&remote, &cache, &resource, migration).await;
    if loaded.source == Source::Cache {
        eprintln!("Server unreachable, editing the cached board");
    }

    let mut board = Board::from_payload(&loaded.envelope.payload);
    if !edit.apply(&mut board) {
        anyhow::bail!("Board unchanged: unknown id or the item is already there");
    }
    print_board_summary(&board);

    let envelope = Envelope::new(migration.current_version(), board.to_payload());
    sync_edit(&settings, resource, envelope).await
}
