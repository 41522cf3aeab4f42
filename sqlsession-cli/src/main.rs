//! sqlsession CLI - Command-line administration for SQL-backed sessions
//!
//! Inspects, edits and sweeps the session table through the configured provider

use clap::{Parser, Subcommand};
use serde_json::Value;
use sqlsession_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success, spawn_gc_task,
    ErrorContext, LoggingConfig, ProviderRegistry, SessionConfig, SessionError, SessionProvider,
    SessionResult,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sqlsession")]
#[command(about = "Administer sessions stored in a SQL database")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the number of stored sessions
    Count,

    /// Delete expired sessions once
    Gc,

    /// Sweep expired sessions every `gc_interval_secs` until interrupted
    Watch,

    /// Check whether a session exists
    Exists {
        /// Session identifier
        id: String,
    },

    /// Print the contents of a session
    Show {
        /// Session identifier
        id: String,
    },

    /// Set a key in a session and write it back
    Set {
        /// Session identifier
        id: String,

        /// Key to set
        key: String,

        /// Value as JSON (plain text is stored as a string)
        value: String,
    },

    /// Delete a session
    Destroy {
        /// Session identifier
        id: String,
    },

    /// Move a session to a new identifier
    Regenerate {
        /// Current session identifier
        old_id: String,

        /// New session identifier
        new_id: String,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize default configuration
        #[arg(long)]
        init: bool,

        /// Validate current configuration
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> SessionResult<()> {
    let cli = Cli::parse();

    // The config file may not exist or be invalid yet
    if let Commands::Config {
        show,
        init,
        validate,
    } = cli.command
    {
        setup_logging(&LoggingConfig::default(), cli.verbose)?;
        return handle_config(cli.config.as_ref(), show, init, validate);
    }

    let config = load_config(cli.config.as_ref())?;
    setup_logging(&config.logging, cli.verbose)?;

    info!("Starting sqlsession CLI v{}", env!("CARGO_PKG_VERSION"));

    let provider = open_provider(&config).await?;
    let result = run(cli.command, provider, &config).await;
    if let Err(e) = &result {
        e.log();
    }
    result
}

fn setup_logging(logging: &LoggingConfig, verbose: bool) -> SessionResult<()> {
    let mut logging_config = logging.clone();
    if verbose {
        logging_config.level = "debug".to_string();
    }

    init_logging(&logging_config).map_err(|e| SessionError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check the [logging] section of your configuration"),
    })
}

/// Load and validate configuration
fn load_config(config_path: Option<&PathBuf>) -> SessionResult<SessionConfig> {
    let config = read_config(config_path)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with environment overrides applied, without validating
fn read_config(config_path: Option<&PathBuf>) -> SessionResult<SessionConfig> {
    let mut config = if let Some(path) = config_path {
        SessionConfig::from_file(path)?
    } else {
        default_config_paths()
            .into_iter()
            .find(|p| p.exists())
            .map(SessionConfig::from_file)
            .transpose()?
            .unwrap_or_default()
    };

    config.apply_env_overrides()?;
    Ok(config)
}

/// Locations searched when no `--config` is given, in priority order
fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::config_dir().map(|d| d.join("sqlsession").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".sqlsession").join("config.toml")),
        Some(PathBuf::from("sqlsession.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

async fn open_provider(config: &SessionConfig) -> SessionResult<Arc<dyn SessionProvider>> {
    let mut registry = ProviderRegistry::new();
    sqlsession_store::register_with_config(&mut registry, config.clone())?;

    log_operation_start!("open_provider", provider = %config.provider);
    let provider = registry
        .open(
            &config.provider,
            config.expire_secs,
            &config.connection_string,
        )
        .await?;
    log_operation_success!("open_provider", provider = %config.provider);
    Ok(provider)
}

async fn run(
    command: Commands,
    provider: Arc<dyn SessionProvider>,
    config: &SessionConfig,
) -> SessionResult<()> {
    let provider_ref = provider.as_ref();
    match command {
        Commands::Count => {
            println!("{}", provider_ref.count().await);
        }
        Commands::Gc => {
            let before = provider_ref.count().await;
            provider_ref.gc().await;
            let after = provider_ref.count().await;
            println!(
                "Removed {} expired session(s), {} remaining",
                before.saturating_sub(after),
                after
            );
        }
        Commands::Watch => {
            let sweeper = start_background_gc(Arc::clone(&provider), config);
            println!(
                "Sweeping expired sessions every {}s, press Ctrl-C to stop",
                config.gc_interval_secs
            );
            tokio::signal::ctrl_c().await?;
            sweeper.abort();
            info!("Background GC stopped");
        }
        Commands::Exists { id } => {
            println!("{}", provider_ref.exist(&id).await);
        }
        Commands::Show { id } => handle_show(provider_ref, &id).await?,
        Commands::Set { id, key, value } => handle_set(provider_ref, &id, &key, &value).await?,
        Commands::Destroy { id } => {
            provider_ref.destroy(&id).await?;
            println!("Destroyed session {}", id);
        }
        Commands::Regenerate { old_id, new_id } => {
            log_operation_start!("regenerate", old_id = %old_id, new_id = %new_id);
            match provider_ref.regenerate(&old_id, &new_id).await {
                Ok(store) => {
                    log_operation_success!("regenerate", new_id = %store.id());
                    println!("Session {} is now {}", old_id, store.id());
                }
                Err(e) => {
                    log_operation_error!("regenerate", e, old_id = %old_id);
                    return Err(e);
                }
            }
        }
        Commands::Config { .. } => {
            return Err(config_error!(
                "config is handled before a provider is opened",
                "cli"
            ))
        }
    }

    Ok(())
}

/// Run GC against `provider` every configured interval
fn start_background_gc(
    provider: Arc<dyn SessionProvider>,
    config: &SessionConfig,
) -> JoinHandle<()> {
    info!(
        interval_secs = config.gc_interval_secs,
        "Starting background session GC"
    );
    spawn_gc_task(provider, config.gc_interval())
}

async fn handle_show(provider: &dyn SessionProvider, id: &str) -> SessionResult<()> {
    // Reading a missing id would create an empty row
    if !provider.exist(id).await {
        warn!(session_id = %id, "Session not found");
        println!("Session {} not found", id);
        return Ok(());
    }

    let store = provider.read(id).await?;
    let mut map = serde_json::Map::new();
    for key in store.keys().await {
        if let Some(value) = store.get(&key).await {
            map.insert(key, value);
        }
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(map))?);
    Ok(())
}

async fn handle_set(
    provider: &dyn SessionProvider,
    id: &str,
    key: &str,
    raw: &str,
) -> SessionResult<()> {
    let value = parse_value(raw);

    log_operation_start!("set", session_id = %id, key = %key);
    let store = provider.read(id).await?;
    store.set(key, value.clone()).await?;
    if let Err(e) = store.release().await {
        log_operation_error!("set", e, session_id = %id);
        return Err(e);
    }
    log_operation_success!("set", session_id = %id, key = %key);

    println!("Set {}.{} = {}", id, key, value);
    Ok(())
}

/// Parse a value as JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn handle_config(
    config_path: Option<&PathBuf>,
    show: bool,
    init: bool,
    validate: bool,
) -> SessionResult<()> {
    if init {
        let path = match config_path {
            Some(path) => path.clone(),
            None => default_config_paths()
                .into_iter()
                .next()
                .ok_or_else(|| SessionError::Config {
                    message: "Could not determine a configuration directory".to_string(),
                    source: None,
                    context: ErrorContext::new("config_init")
                        .with_suggestion("Pass --config <path> explicitly"),
                })?,
        };

        SessionConfig::default().save_to_file(&path)?;
        println!("Configuration initialized at: {:?}", path);
    }

    if show {
        let config = read_config(config_path)?;
        let rendered = toml::to_string_pretty(&config).map_err(|e| SessionError::Config {
            message: format!("Failed to render configuration: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config_show"),
        })?;
        println!("Current configuration:");
        println!("{}", rendered);
    }

    if validate {
        match read_config(config_path).and_then(|config| config.validate()) {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                println!("Configuration validation failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value_accepts_json_and_text() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value(r#"{"a":[1,2]}"#), json!({"a": [1, 2]}));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("plain text"), json!("plain text"));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["sqlsession", "set", "s1", "uid", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Set { ref id, ref key, ref value } if id == "s1" && key == "uid" && value == "7"
        ));

        let cli =
            Cli::try_parse_from(["sqlsession", "-v", "regenerate", "old", "new"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Regenerate { .. }));

        assert!(Cli::try_parse_from(["sqlsession", "exists"]).is_err());
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = SessionConfig {
            expire_secs: 600,
            ..SessionConfig::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.expire_secs, 600);
    }

    #[test]
    fn test_config_init_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(!path.exists());

        handle_config(Some(&path), false, true, false).unwrap();

        assert!(path.exists());
        assert_eq!(SessionConfig::from_file(&path).unwrap(), SessionConfig::default());

        // Show and validate work on the freshly written file
        handle_config(Some(&path), true, false, true).unwrap();
    }

    #[test]
    fn test_config_validate_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "expire_secs = 0\n").unwrap();

        // The file still loads for display
        assert_eq!(read_config(Some(&path)).unwrap().expire_secs, 0);

        let err = handle_config(Some(&path), false, false, true).unwrap_err();
        assert!(err.to_string().contains("expire_secs"));
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_watch_subcommand_parses() {
        let cli = Cli::try_parse_from(["sqlsession", "watch"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch));
    }

    #[tokio::test]
    async fn test_background_gc_uses_configured_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            connection_string: format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("sessions.db").display()
            ),
            expire_secs: 1,
            gc_interval_secs: 1,
            ..SessionConfig::default()
        };
        let provider = open_provider(&config).await.unwrap();
        handle_set(provider.as_ref(), "short", "uid", "1").await.unwrap();
        assert!(provider.exist("short").await);

        let sweeper = start_background_gc(Arc::clone(&provider), &config);
        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
        sweeper.abort();

        assert!(!provider.exist("short").await);
    }

    #[tokio::test]
    async fn test_set_then_show_through_provider() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            connection_string: format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("sessions.db").display()
            ),
            ..SessionConfig::default()
        };
        let provider = open_provider(&config).await.unwrap();

        handle_set(provider.as_ref(), "s1", "uid", "7").await.unwrap();
        handle_show(provider.as_ref(), "s1").await.unwrap();

        let store = provider.read("s1").await.unwrap();
        assert_eq!(store.get("uid").await, Some(json!(7)));

        // Showing a missing session must not create it
        handle_show(provider.as_ref(), "missing").await.unwrap();
        assert!(!provider.exist("missing").await);
    }
}
