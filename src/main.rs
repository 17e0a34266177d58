//! # CRM CLI (`crm`)
//!
//! Command-line front end for the CRM backend: sign in, list and filter
//! collections, and create, update or delete records.
//!
//! ## Usage
//!
//! ```bash
//! crm --config ./crm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crm login <username>` | Authenticate and persist the session |
//! | `crm register <username>` | Create an account and sign in |
//! | `crm logout` | Forget the persisted session |
//! | `crm whoami` | Show the signed-in user |
//! | `crm list <kind>` | List a collection with client-side filters |
//! | `crm get <kind> <id>` | Show one record |
//! | `crm create <kind> --data <json>` | Create a record |
//! | `crm update <kind> <id> --data <json>` | Update a record |
//! | `crm delete <kind> <id>` | Delete a record |
//! | `crm search <query>` | Search across every kind |
//! | `crm completions <shell>` | Print shell completions |
//!
//! Kinds: `customers`, `deals`, `tasks`, `contacts`, `notes`, `users`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use crm_client::api::HttpClient;
use crm_client::commands::{self, ListOptions};
use crm_client::config::{self, Config};
use crm_client::context::CrmContext;
use crm_client::models::EntityKind;
use crm_client::notify::NotifyMode;
use crm_client::session::SessionStore;

/// CRM CLI: cached, consistent access to CRM collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "crm",
    about = "Command-line client for the CRM REST backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, built-in defaults are used
    /// (backend at http://localhost:8083/api).
    #[arg(long, global = true, default_value = "./crm.toml")]
    config: PathBuf,

    /// Emit JSON on stdout and JSON notifications on stderr.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and persist the session.
    ///
    /// Without `--password` the password is read from stdin.
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and sign in with it.
    Register {
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the persisted session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// List a collection.
    ///
    /// Filters run on the client after the list is fetched: `--where` on
    /// categorical fields (city, status, ...) matches exactly, on other
    /// fields by substring, both ignoring case.
    List {
        /// Entity kind (customers, deals, tasks, contacts, notes, users).
        kind: EntityKind,

        /// Filter as `field=value`. Repeatable; filters combine with AND.
        #[arg(long = "where", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Free-text term matched against the kind's searchable fields.
        #[arg(long)]
        search: Option<String>,

        /// Only records dated on or after this day (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// Only records dated on or before this day (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,

        /// Field used by `--from/--to` (defaults to the kind's main date).
        #[arg(long)]
        date_field: Option<String>,

        /// Sort by this field. Records missing it are listed last.
        #[arg(long)]
        sort: Option<String>,

        /// Sort descending.
        #[arg(long, requires = "sort")]
        desc: bool,

        /// Server-side lookup as `key=value`: name, city, state, country,
        /// owner (customers) or role (users).
        #[arg(long, value_parser = parse_key_val)]
        by: Option<(String, String)>,
    },

    /// Show one record.
    Get { kind: EntityKind, id: String },

    /// Create a record from a JSON object.
    Create {
        kind: EntityKind,
        #[arg(long)]
        data: String,
    },

    /// Update a record from a JSON object.
    Update {
        kind: EntityKind,
        id: String,
        #[arg(long)]
        data: String,
    },

    /// Delete a record.
    Delete { kind: EntityKind, id: String },

    /// Search across every kind.
    Search { query: String },

    /// Print shell completions.
    Completions { shell: Shell },
}

/// Parse a `key=value` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Loads the config file when present, defaults otherwise. An existing but
/// invalid file is an error.
fn resolve_config(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "crm", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = resolve_config(&cli.config)?;
    let sessions = SessionStore::from_config(&cfg.session);

    match &cli.command {
        Commands::Login { username, password } => {
            let http = HttpClient::new(&cfg.api)?;
            return commands::run_login(&http, &sessions, username, password.clone(), cli.json)
                .await;
        }
        Commands::Register {
            username,
            email,
            password,
        } => {
            let http = HttpClient::new(&cfg.api)?;
            return commands::run_register(
                &http,
                &sessions,
                username,
                email.as_deref(),
                password.clone(),
                cli.json,
            )
            .await;
        }
        Commands::Logout => return commands::run_logout(&sessions),
        _ => {}
    }

    let notifier = Arc::from(NotifyMode::detect(cli.json).notifier());
    let mut ctx = CrmContext::new(cfg, notifier)?;
    if let Some(session) = sessions.touch()? {
        ctx = ctx.with_session(&session);
    }

    match cli.command {
        Commands::Whoami => commands::run_whoami(&ctx, cli.json).await?,
        Commands::List {
            kind,
            filters,
            search,
            from,
            to,
            date_field,
            sort,
            desc,
            by,
        } => {
            let opts = ListOptions {
                filters,
                search,
                date_field,
                from,
                to,
                sort,
                desc,
                by,
            };
            commands::run_list(&ctx, kind, &opts, cli.json).await?;
        }
        Commands::Get { kind, id } => commands::run_get(&ctx, kind, &id, cli.json).await?,
        Commands::Create { kind, data } => {
            commands::run_create(&ctx, kind, &data, cli.json).await?
        }
        Commands::Update { kind, id, data } => {
            commands::run_update(&ctx, kind, &id, &data, cli.json).await?
        }
        Commands::Delete { kind, id } => {
            commands::run_delete(&ctx, kind, &id).await?;
            if !cli.json {
                println!("Deleted {} {}.", kind.label().to_lowercase(), id);
            }
        }
        Commands::Search { query } => commands::run_search(&ctx, &query, cli.json).await?,
        Commands::Login { .. }
        | Commands::Register { .. }
        | Commands::Logout
        | Commands::Completions { .. } => {
            // Handled above
            unreachable!()
        }
    }

    Ok(())
}
