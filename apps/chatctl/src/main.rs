use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chat::{
    Conversation, ConversationRepository, Message, MessageRepository, MessageRole,
    NewConversation, NewMessage, NewUser, User, UserRepository,
};
use chat_db::{ConnectOpts, DbHandle, DomainError};
use clap::{Parser, Subcommand};
use runtime::{AppConfig, CliArgs, DatabaseConfig};
use serde_json::json;
use uuid::Uuid;

/// Exit status for failures that map to a client-facing domain error.
const DOMAIN_ERROR_EXIT: u8 = 3;

/// chatctl - manage the chat store from the command line
#[derive(Parser)]
#[command(name = "chatctl")]
#[command(about = "chatctl - manage users, conversations and messages in the chat store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database DSN (overrides config)
    #[arg(long)]
    database_url: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration and database connectivity
    Check,
    /// Apply pending schema migrations
    Migrate,
    /// Create a user
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Already-hashed password; stored as given
        #[arg(long)]
        password_hash: String,
    },
    /// Start a conversation for a user
    AddConversation {
        #[arg(long)]
        user_id: Uuid,
        #[arg(long)]
        title: Option<String>,
    },
    /// Append a message to a conversation
    PostMessage {
        #[arg(long)]
        conversation_id: Uuid,
        /// user, assistant or system
        #[arg(long, default_value = "user")]
        role: MessageRole,
        #[arg(long)]
        content: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

/// Domain errors become a JSON payload on stderr; anything else is printed
/// with its context chain.
fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<DomainError>() {
        Some(domain) => {
            tracing::debug!(error = ?domain, "command failed with domain error");
            let body = json!({
                "status": domain.http_status(),
                "error": domain.to_payload(),
            });
            eprintln!("{body}");
            ExitCode::from(DOMAIN_ERROR_EXIT)
        }
        None => {
            tracing::error!(error = ?err, "command failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // CLI args passed down to config
    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        database_url: cli.database_url.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    // Print config and exit if requested
    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, Path::new(&config.home_dir));
    tracing::info!("chatctl starting");

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Check => check(&config).await,
        Commands::Migrate => {
            let db = connect(&config).await?;
            chat::migrate(&db).await?;
            db.close().await;
            println!("Migrations applied");
            Ok(())
        }
        Commands::AddUser {
            username,
            email,
            password_hash,
        } => {
            let db = connect(&config).await?;
            let mut session = db.session();
            let user = UserRepository::new(&mut session)
                .create_user(NewUser {
                    username,
                    email,
                    hashed_password: password_hash,
                })
                .await?;
            session.commit().await.context("commit failed")?;
            println!("{}", user_json(&user));
            Ok(())
        }
        Commands::AddConversation { user_id, title } => {
            let db = connect(&config).await?;
            let mut session = db.session();
            let conversation = ConversationRepository::new(&mut session)
                .create_conversation(NewConversation { user_id, title })
                .await?;
            session.commit().await.context("commit failed")?;
            println!("{}", conversation_json(&conversation));
            Ok(())
        }
        Commands::PostMessage {
            conversation_id,
            role,
            content,
        } => {
            let db = connect(&config).await?;
            let mut session = db.session();
            let message = MessageRepository::new(&mut session)
                .create_message(NewMessage {
                    conversation_id,
                    role,
                    content,
                })
                .await?;
            session.commit().await.context("commit failed")?;
            println!("{}", message_json(&message));
            Ok(())
        }
    }
}

async fn check(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let db = connect(config).await?;
    tracing::info!(engine = ?db.engine(), "Database reachable");
    db.close().await;

    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}

async fn connect(config: &AppConfig) -> Result<DbHandle> {
    let db_config = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("Database is not configured"))?;
    let dsn = resolve_dsn(db_config, Path::new(&config.home_dir))?;

    let opts = ConnectOpts {
        max_conns: db_config.max_conns,
        acquire_timeout: db_config.acquire_timeout_sec.map(Duration::from_secs),
        sqlx_logging: db_config.sqlx_logging,
        create_sqlite_dirs: true,
        ..Default::default()
    };
    DbHandle::connect(&dsn, opts)
        .await
        .context("failed to connect to the database")
}

/// Trimmed DSN with relative SQLite paths anchored at `home_dir`.
fn resolve_dsn(db_config: &DatabaseConfig, home_dir: &Path) -> Result<String> {
    let dsn = db_config.url.trim();
    if dsn.is_empty() {
        bail!("Database URL not configured");
    }
    if dsn.starts_with("sqlite://") {
        return absolutize_sqlite_dsn(dsn, home_dir);
    }
    Ok(dsn.to_owned())
}

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps in-memory DSNs as-is.
/// - Normalizes backslashes into forward slashes (important on Windows).
fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path) -> Result<String> {
    if dsn.contains(":memory:") {
        return Ok(dsn.to_owned());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {dsn})"))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        bail!("Empty SQLite path in DSN");
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

fn user_json(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "is_active": user.is_active,
        "created_at": user.created_at.to_rfc3339(),
    })
}

fn conversation_json(conversation: &Conversation) -> serde_json::Value {
    json!({
        "id": conversation.id,
        "user_id": conversation.user_id,
        "title": conversation.title,
        "created_at": conversation.created_at.to_rfc3339(),
    })
}

fn message_json(message: &Message) -> serde_json::Value {
    json!({
        "id": message.id,
        "conversation_id": message.conversation_id,
        "role": message.role.as_str(),
        "content": message.content,
        "created_at": message.created_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_sqlite_path_is_anchored_at_home() {
        let dsn = absolutize_sqlite_dsn("sqlite://database/chat.db?mode=rwc", Path::new("/srv/chat"))
            .unwrap();
        assert_eq!(dsn, "sqlite:///srv/chat/database/chat.db?mode=rwc");
    }

    #[test]
    fn absolute_and_memory_dsns_are_kept() {
        assert_eq!(
            absolutize_sqlite_dsn("sqlite:///tmp/x.db", Path::new("/srv")).unwrap(),
            "sqlite:///tmp/x.db"
        );
        assert_eq!(
            absolutize_sqlite_dsn("sqlite::memory:", Path::new("/srv")).unwrap(),
            "sqlite::memory:"
        );
    }

    #[test]
    fn empty_url_is_rejected() {
        let cfg = DatabaseConfig {
            url: "  ".into(),
            max_conns: None,
            acquire_timeout_sec: None,
            sqlx_logging: false,
        };
        assert!(resolve_dsn(&cfg, Path::new("/srv")).is_err());
    }

    #[test]
    fn postgres_dsn_passes_through() {
        let cfg = DatabaseConfig {
            url: " postgres://u:p@localhost/chat ".into(),
            max_conns: None,
            acquire_timeout_sec: None,
            sqlx_logging: false,
        };
        assert_eq!(
            resolve_dsn(&cfg, Path::new("/srv")).unwrap(),
            "postgres://u:p@localhost/chat"
        );
    }
}
