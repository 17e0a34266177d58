//! CLI command implementations.
//!
//! Each `run_*` function backs one `crm` subcommand. Results go to stdout
//! (aligned columns, or JSON with `--json`); notifications and logs go to
//! stderr. Commands taking an entity kind dispatch to a generic
//! implementation through [`StoreFor`].

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::{HttpClient, ListQuery, Lookup};
use crate::context::{CrmContext, StoreFor};
use crate::filter::{active_filters, FilterSpec, SortDirection};
use crate::models::{
    Contact, Customer, Deal, Entity, EntityId, EntityKind, FieldValue, Note, Task, User,
};
use crate::search;
use crate::session::{Session, SessionStore};

/// Calls `$f::<Kind>($args)` for the entity type matching `$kind`.
macro_rules! by_kind {
    ($kind:expr, $f:ident ( $($arg:expr),* )) => {
        match $kind {
            EntityKind::Customer => $f::<Customer>($($arg),*).await,
            EntityKind::Deal => $f::<Deal>($($arg),*).await,
            EntityKind::Task => $f::<Task>($($arg),*).await,
            EntityKind::Contact => $f::<Contact>($($arg),*).await,
            EntityKind::Note => $f::<Note>($($arg),*).await,
            EntityKind::User => $f::<User>($($arg),*).await,
        }
    };
}

/// Options of `crm list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// `field=value` criteria.
    pub filters: Vec<(String, String)>,
    pub search: Option<String>,
    pub date_field: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub sort: Option<String>,
    pub desc: bool,
    /// Server-side lookup as `key=value` (name, city, state, country, owner, role).
    pub by: Option<(String, String)>,
}

// ============ Auth ============

/// Prompts for a password without echo on a terminal. Piped stdin is
/// read as one line so scripts can feed it.
fn read_password() -> Result<String> {
    if atty::is(atty::Stream::Stdin) {
        let password = Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Password")
            .interact()
            .context("Failed to read password")?;
        return non_empty_password(password);
    }
    password_from_reader(std::io::stdin().lock())
}

fn password_from_reader(mut reader: impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    non_empty_password(line.trim_end_matches(['\r', '\n']).to_string())
}

fn non_empty_password(password: String) -> Result<String> {
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

pub async fn run_login(
    http: &HttpClient,
    sessions: &SessionStore,
    username: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    if username.trim().is_empty() {
        bail!("Username must not be empty");
    }
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };
    let auth = http.login(username, &password).await?;
    let session = Session::new(auth.token, auth.user);
    sessions.save(&session)?;

    if json {
        print_json(&session.user)?;
    } else {
        println!("Logged in as {}.", session.user.username);
    }
    Ok(())
}

pub async fn run_register(
    http: &HttpClient,
    sessions: &SessionStore,
    username: &str,
    email: Option<&str>,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    if username.trim().is_empty() {
        bail!("Username must not be empty");
    }
    if let Some(email) = email {
        if !email.contains('@') {
            bail!("Invalid email: '{}'", email);
        }
    }
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };
    let auth = http.register(username, &password, email).await?;
    let session = Session::new(auth.token, auth.user);
    sessions.save(&session)?;

    if json {
        print_json(&session.user)?;
    } else {
        println!("Registered and logged in as {}.", session.user.username);
    }
    Ok(())
}

pub fn run_logout(sessions: &SessionStore) -> Result<()> {
    if sessions.clear()? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub async fn run_whoami(ctx: &CrmContext, json: bool) -> Result<()> {
    let user = ctx.http().me().await?;
    if json {
        print_json(&user)?;
    } else {
        println!("{}", user.username);
        if let Some(email) = &user.email {
            println!("  email: {}", email);
        }
        if !user.roles.is_empty() {
            println!("  roles: {}", user.roles.join(", "));
        }
    }
    Ok(())
}

// ============ Entities ============

pub async fn run_list(ctx: &CrmContext, kind: EntityKind, opts: &ListOptions, json: bool) -> Result<()> {
    by_kind!(kind, list_kind(ctx, opts, json))
}

pub async fn run_get(ctx: &CrmContext, kind: EntityKind, id: &str, json: bool) -> Result<()> {
    by_kind!(kind, get_kind(ctx, id, json))
}

pub async fn run_create(ctx: &CrmContext, kind: EntityKind, data: &str, json: bool) -> Result<()> {
    by_kind!(kind, create_kind(ctx, data, json))
}

pub async fn run_update(
    ctx: &CrmContext,
    kind: EntityKind,
    id: &str,
    data: &str,
    json: bool,
) -> Result<()> {
    by_kind!(kind, update_kind(ctx, id, data, json))
}

pub async fn run_delete(ctx: &CrmContext, kind: EntityKind, id: &str) -> Result<()> {
    by_kind!(kind, delete_kind(ctx, id))
}

pub async fn run_search(ctx: &CrmContext, query: &str, json: bool) -> Result<()> {
    let hits = search::global_search(ctx.http(), query).await?;
    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("{:<10} {:<8} NAME", "TYPE", "ID");
    for hit in &hits {
        let id = hit.id.as_ref().map(|i| i.to_string()).unwrap_or_default();
        println!("{:<10} {:<8} {}", hit.kind, id, hit.name);
    }
    Ok(())
}

async fn list_kind<E: Entity>(ctx: &CrmContext, opts: &ListOptions, json: bool) -> Result<()>
where
    CrmContext: StoreFor<E>,
{
    let spec = filter_spec::<E>(opts)?;
    let query = match &opts.by {
        Some((key, value)) => ListQuery::lookup(parse_lookup(key, value)?),
        None => ListQuery::all(),
    };

    let store = StoreFor::<E>::store(ctx);
    store.fetch_all(&query).await?;
    let items = store.view(&spec);

    if json {
        return print_json(&items);
    }

    for active in active_filters(&spec) {
        eprintln!("{}: {}", active.label, active.value);
    }
    print_table(&items);
    let noun = if items.len() == 1 {
        E::KIND.label().to_lowercase()
    } else {
        E::KIND.as_str().to_string()
    };
    println!("\n{} {} found", items.len(), noun);
    Ok(())
}

async fn get_kind<E: Entity>(ctx: &CrmContext, id: &str, json: bool) -> Result<()>
where
    CrmContext: StoreFor<E>,
{
    let id: EntityId = id.into();
    let entity = StoreFor::<E>::store(ctx).fetch_one(&id).await?;
    if json {
        print_json(&entity)
    } else {
        print_record(&entity)
    }
}

fn parse_draft<E: DeserializeOwned>(kind: EntityKind, data: &str) -> Result<E> {
    serde_json::from_str(data).with_context(|| format!("Invalid {} JSON", kind.label().to_lowercase()))
}

async fn create_kind<E: Entity>(ctx: &CrmContext, data: &str, json: bool) -> Result<()>
where
    CrmContext: StoreFor<E>,
{
    let draft: E = parse_draft(E::KIND, data)?;
    let created = StoreFor::<E>::store(ctx).create(&draft).await?;
    if json {
        print_json(&created)
    } else {
        print_record(&created)
    }
}

async fn update_kind<E: Entity>(ctx: &CrmContext, id: &str, data: &str, json: bool) -> Result<()>
where
    CrmContext: StoreFor<E>,
{
    let id: EntityId = id.into();
    let draft: E = parse_draft(E::KIND, data)?;
    let updated = StoreFor::<E>::store(ctx).update(&id, &draft).await?;
    if json {
        print_json(&updated)
    } else {
        print_record(&updated)
    }
}

async fn delete_kind<E: Entity>(ctx: &CrmContext, id: &str) -> Result<()>
where
    CrmContext: StoreFor<E>,
{
    let id: EntityId = id.into();
    StoreFor::<E>::store(ctx).delete(&id).await?;
    Ok(())
}

// ============ Helpers ============

fn parse_lookup(key: &str, value: &str) -> Result<Lookup> {
    let value = value.to_string();
    Ok(match key {
        "name" => Lookup::Name(value),
        "city" => Lookup::City(value),
        "state" => Lookup::State(value),
        "country" => Lookup::Country(value),
        "owner" | "user" => Lookup::Owner(value.as_str().into()),
        "role" => Lookup::Role(value),
        other => bail!(
            "Unknown lookup: '{}'. Use name, city, state, country, owner, or role.",
            other
        ),
    })
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid --{} date '{}', expected YYYY-MM-DD", flag, value))
}

/// Date field used by `--from/--to` when `--date-field` is not given.
fn default_date_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Customer => "createdDate",
        EntityKind::Deal => "dealDate",
        EntityKind::Task => "dueDate",
        EntityKind::Note => "createdAt",
        EntityKind::Contact | EntityKind::User => "date",
    }
}

/// Builds the display filter from CLI options.
pub fn filter_spec<E: Entity>(opts: &ListOptions) -> Result<FilterSpec> {
    let mut spec = FilterSpec::new();
    for (field, value) in &opts.filters {
        spec = spec.with(field, value.clone());
    }
    if let Some(term) = &opts.search {
        spec = spec.search(term.clone());
    }
    if opts.from.is_some() || opts.to.is_some() {
        let from = opts.from.as_deref().map(|v| parse_date("from", v)).transpose()?;
        let to = opts.to.as_deref().map(|v| parse_date("to", v)).transpose()?;
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                bail!("--from {} is after --to {}", f, t);
            }
        }
        let field = opts
            .date_field
            .clone()
            .unwrap_or_else(|| default_date_field(E::KIND).to_string());
        spec = spec.date_range(&field, from, to);
    }
    if let Some(field) = &opts.sort {
        let direction = if opts.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        spec = spec.sort_by(field, direction);
    }
    Ok(spec)
}

/// Extra columns shown by `crm list` per kind.
fn summary_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Customer => &["email", "city", "companyName"],
        EntityKind::Deal => &["stage", "amount", "dealDate"],
        EntityKind::Task => &["status", "priority", "dueDate"],
        EntityKind::Contact => &["email", "position"],
        EntityKind::Note => &["createdAt"],
        EntityKind::User => &["email", "roles"],
    }
}

fn cell<E: Entity>(item: &E, field: &str) -> String {
    match item.field(field) {
        Some(FieldValue::Text(s)) => s,
        Some(FieldValue::Float(x)) => format!("{:.2}", x),
        Some(other) => other.as_text(),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

fn print_table<E: Entity>(items: &[E]) {
    let fields = summary_fields(E::KIND);
    let mut header = format!("{:<8} {:<32}", "ID", "NAME");
    for f in fields {
        header.push_str(&format!(" {:<20}", f.to_uppercase()));
    }
    println!("{}", header.trim_end());
    for item in items {
        let id = item.id().map(|i| i.to_string()).unwrap_or_default();
        let mut line = format!("{:<8} {:<32}", id, truncate(&item.display_name(), 32));
        for f in fields {
            line.push_str(&format!(" {:<20}", truncate(&cell(item, f), 20)));
        }
        println!("{}", line.trim_end());
    }
}

fn print_record<E: Entity>(entity: &E) -> Result<()> {
    let value = serde_json::to_value(entity)?;
    println!("{} {}", E::KIND.label(), entity.id().map(|i| i.to_string()).unwrap_or_default());
    if let serde_json::Value::Object(map) = value {
        for (key, v) in map {
            if key == "id" || key == "password" {
                continue;
            }
            let shown = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            println!("  {:<18} {}", key, shown);
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
