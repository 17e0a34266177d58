//! Core data models for the CRM entity kinds.
//!
//! Each kind (customers, deals, tasks, contacts, notes, users) is a plain
//! serde struct mirroring the backend's JSON representation. The
//! [`Entity`] trait is the seam used by the generic store, cache and
//! filter pipeline: it exposes the identifier, the kind, and a by-name
//! field accessor returning [`FieldValue`]s for filtering and sorting.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, CrmResult};

/// Entity identifier. The backend uses numeric ids; string ids are
/// accepted so the same collection machinery works for either.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl EntityId {
    /// Rejects identifiers that can never address a record (empty, `"null"`).
    pub fn validate(&self) -> CrmResult<()> {
        match self {
            EntityId::Str(s) if s.trim().is_empty() || s == "null" || s == "undefined" => Err(
                CrmError::validation("id", format!("invalid identifier '{}'", s)),
            ),
            _ => Ok(()),
        }
    }

    /// Identity comparison across representations: `Int(2)` and `Str("2")`
    /// address the same record.
    pub fn matches(&self, other: &EntityId) -> bool {
        match (self, other) {
            (EntityId::Int(a), EntityId::Int(b)) => a == b,
            (EntityId::Str(a), EntityId::Str(b)) => a == b,
            (EntityId::Int(n), EntityId::Str(s)) | (EntityId::Str(s), EntityId::Int(n)) => {
                *s == n.to_string()
            }
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{}", n),
            EntityId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| EntityId::Str(s.to_string()))
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(n) => EntityId::Int(n),
            Err(_) => EntityId::Str(s.to_string()),
        })
    }
}

/// The six record kinds served by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Customer,
    Deal,
    Task,
    Contact,
    Note,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Customer,
        EntityKind::Deal,
        EntityKind::Task,
        EntityKind::Contact,
        EntityKind::Note,
        EntityKind::User,
    ];

    /// Plural, lowercase name. Also the first path segment of the kind's
    /// endpoints, which makes it the cache-key prefix for its reads.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customers",
            EntityKind::Deal => "deals",
            EntityKind::Task => "tasks",
            EntityKind::Contact => "contacts",
            EntityKind::Note => "notes",
            EntityKind::User => "users",
        }
    }

    /// Singular display label (`"Customer"`).
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Customer => "Customer",
            EntityKind::Deal => "Deal",
            EntityKind::Task => "Task",
            EntityKind::Contact => "Contact",
            EntityKind::Note => "Note",
            EntityKind::User => "User",
        }
    }

    /// Kinds whose records embed a reference to this kind. A write to
    /// `self` makes cached reads of these kinds stale as well.
    pub fn dependents(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Customer => &[
                EntityKind::Deal,
                EntityKind::Task,
                EntityKind::Contact,
                EntityKind::Note,
            ],
            EntityKind::User => &[EntityKind::Customer, EntityKind::Task],
            EntityKind::Deal => &[EntityKind::Note],
            EntityKind::Task | EntityKind::Contact | EntityKind::Note => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EntityKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "customers" => Ok(EntityKind::Customer),
            "deal" | "deals" => Ok(EntityKind::Deal),
            "task" | "tasks" => Ok(EntityKind::Task),
            "contact" | "contacts" => Ok(EntityKind::Contact),
            "note" | "notes" => Ok(EntityKind::Note),
            "user" | "users" => Ok(EntityKind::User),
            other => anyhow::bail!(
                "Unknown entity kind: '{}'. Must be one of customers, deals, tasks, contacts, notes, users.",
                other
            ),
        }
    }
}

/// A scalar field value extracted for filtering and sorting.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    /// Lowercased textual form, used for categorical equality and
    /// substring matching.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.to_lowercase(),
            FieldValue::Int(n) => n.to_string(),
            FieldValue::Float(x) => x.to_string(),
            FieldValue::Date(d) => d.to_string(),
            FieldValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }

    /// Calendar date of a date-like value; `None` for text and numbers.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::DateTime(dt) => Some(dt.date()),
            FieldValue::Text(s) => parse_date_prefix(s),
            _ => None,
        }
    }

    fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::Date(d) => d.and_hms_opt(0, 0, 0),
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Int(n) => Some(*n as f64),
            FieldValue::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Total order used by the sort stage: chronological for dates,
    /// numeric for numbers, case-insensitive lexicographic otherwise.
    pub fn compare(&self, other: &FieldValue) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_datetime(), other.as_datetime()) {
            return a.cmp(&b);
        }
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        self.as_text().cmp(&other.as_text())
    }
}

/// Parses `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_date_prefix(s: &str) -> Option<NaiveDate> {
    let head = s.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Common interface of every CRM record kind.
///
/// Drafts (records not yet persisted) are the same type with `id == None`;
/// the server assigns identifiers and defaults on create.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;

    fn id(&self) -> Option<&EntityId>;

    /// Looks up a field by its JSON (camelCase) name.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Fields matched by the free-text search term.
    fn search_fields() -> &'static [&'static str];

    /// Human-readable name used in listings and search results.
    fn display_name(&self) -> String;

    /// Fills in defaults the backend requires on update.
    fn normalize_draft(&mut self) {}

    /// True when this record is addressed by `id`.
    fn has_id(&self, id: &EntityId) -> bool {
        self.id().is_some_and(|own| own.matches(id))
    }

    /// Field checks run on a draft before it is sent to the backend.
    fn validate_draft(&self) -> CrmResult<()> {
        Ok(())
    }
}

fn text(v: &Option<String>) -> Option<FieldValue> {
    v.as_ref()
        .filter(|s| !s.is_empty())
        .map(|s| FieldValue::Text(s.clone()))
}

fn int(v: &Option<i64>) -> Option<FieldValue> {
    v.map(FieldValue::Int)
}

fn id_field(v: &Option<EntityId>) -> Option<FieldValue> {
    v.as_ref().map(|id| match id {
        EntityId::Int(n) => FieldValue::Int(*n),
        EntityId::Str(s) => FieldValue::Text(s.clone()),
    })
}

fn require(field: &str, value: &str, message: &str) -> CrmResult<()> {
    if value.trim().is_empty() {
        return Err(CrmError::validation(field, message));
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace and a single `@`.
fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Optional leading `+`, then 10 to 15 digits.
fn is_phone(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    (10..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

fn check_email(field: &str, email: &Option<String>) -> CrmResult<()> {
    match email.as_deref().filter(|e| !e.is_empty()) {
        Some(e) if !is_email(e) => Err(CrmError::validation(
            field,
            "Please enter a valid email address",
        )),
        _ => Ok(()),
    }
}

// ============ Customer ============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl Entity for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => id_field(&self.id),
            "name" => Some(FieldValue::Text(self.name.clone())).filter(|_| !self.name.is_empty()),
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "companyName" | "company" => text(&self.company_name),
            "address" => text(&self.address),
            "city" => text(&self.city),
            "state" => text(&self.state),
            "country" => text(&self.country),
            "postalCode" => text(&self.postal_code),
            "createdDate" => self.created_date.map(FieldValue::DateTime),
            "lastUpdated" => self.last_updated.map(FieldValue::DateTime),
            "userId" | "assignedUserId" => int(&self.user_id),
            _ => None,
        }
    }

    fn search_fields() -> &'static [&'static str] {
        &["name", "email", "companyName"]
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn validate_draft(&self) -> CrmResult<()> {
        require("name", &self.name, "Name is required")?;
        check_email("email", &self.email)
    }
}

// ============ Deal ============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub deal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
}

impl Entity for Deal {
    const KIND: EntityKind = EntityKind::Deal;

    fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => id_field(&self.id),
            "dealName" | "name" => {
                Some(FieldValue::Text(self.deal_name.clone())).filter(|_| !self.deal_name.is_empty())
            }
            "amount" => self.amount.map(FieldValue::Float),
            "stage" | "status" => text(&self.stage),
            "dealDate" | "date" => self.deal_date.map(FieldValue::Date),
            "priority" => text(&self.priority),
            "customerId" | "customer" => int(&self.customer_id),
            _ => None,
        }
    }

    fn search_fields() -> &'static [&'static str] {
        &["dealName", "stage"]
    }

    fn display_name(&self) -> String {
        self.deal_name.clone()
    }

    fn validate_draft(&self) -> CrmResult<()> {
        require("dealName", &self.deal_name, "Deal name is required")?;
        match self.amount {
            Some(amount) if amount > 0.0 => Ok(()),
            _ => Err(CrmError::validation(
                "amount",
                "Deal value must be greater than 0",
            )),
        }
    }
}

// ============ Task ============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_name: Option<String>,
}

impl Entity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => id_field(&self.id),
            "description" | "name" => Some(FieldValue::Text(self.description.clone()))
                .filter(|_| !self.description.is_empty()),
            "dueDate" | "date" => self.due_date.map(FieldValue::Date),
            "status" => text(&self.status),
            "priority" => text(&self.priority),
            "customerId" | "customer" => int(&self.customer_id),
            "customerName" => text(&self.customer_name),
            "assignedUserId" | "assignedUser" => int(&self.assigned_user_id),
            "assignedUserName" => text(&self.assigned_user_name),
            _ => None,
        }
    }

    fn search_fields() -> &'static [&'static str] {
        &["description", "customerName", "assignedUserName"]
    }

    fn display_name(&self) -> String {
        self.description.clone()
    }

    fn validate_draft(&self) -> CrmResult<()> {
        require("description", &self.description, "Description is required")
    }

    fn normalize_draft(&mut self) {
        if self.status.as_deref().map_or(true, str::is_empty) {
            self.status = Some("Pending".to_string());
        }
        if self.priority.as_deref().map_or(true, str::is_empty) {
            self.priority = Some("Medium".to_string());
        }
    }
}

// ============ Contact ============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
}

impl Entity for Contact {
    const KIND: EntityKind = EntityKind::Contact;

    fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => id_field(&self.id),
            "name" => Some(FieldValue::Text(self.name.clone())).filter(|_| !self.name.is_empty()),
            "email" => text(&self.email),
            "phone" => text(&self.phone),
            "position" => text(&self.position),
            "customerId" | "customer" => int(&self.customer_id),
            _ => None,
        }
    }

    fn search_fields() -> &'static [&'static str] {
        &["name", "email", "position"]
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn validate_draft(&self) -> CrmResult<()> {
        require("name", &self.name, "Name is required")?;
        check_email("email", &self.email)?;
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.is_empty()) {
            if !is_phone(phone) {
                return Err(CrmError::validation(
                    "phone",
                    "Please enter a valid phone number (10-15 digits)",
                ));
            }
        }
        if self.customer_id.is_none() {
            return Err(CrmError::validation("customerId", "Customer is required"));
        }
        Ok(())
    }
}

// ============ Note ============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<i64>,
}

impl Entity for Note {
    const KIND: EntityKind = EntityKind::Note;

    fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => id_field(&self.id),
            "content" => {
                Some(FieldValue::Text(self.content.clone())).filter(|_| !self.content.is_empty())
            }
            "createdAt" | "date" => self.created_at.map(FieldValue::DateTime),
            "customerId" | "customer" => int(&self.customer_id),
            "dealId" | "deal" => int(&self.deal_id),
            _ => None,
        }
    }

    fn search_fields() -> &'static [&'static str] {
        &["content"]
    }

    fn display_name(&self) -> String {
        const PREVIEW: usize = 60;
        match self.content.char_indices().nth(PREVIEW) {
            Some((cut, _)) => format!("{}...", &self.content[..cut]),
            None => self.content.clone(),
        }
    }

    fn validate_draft(&self) -> CrmResult<()> {
        require("content", &self.content, "Content is required")
    }
}

// ============ User ============

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Only ever sent on create/update; the backend never returns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => id_field(&self.id),
            "username" | "name" => {
                Some(FieldValue::Text(self.username.clone())).filter(|_| !self.username.is_empty())
            }
            "email" => text(&self.email),
            "role" | "roles" => {
                Some(FieldValue::Text(self.roles.join(","))).filter(|_| !self.roles.is_empty())
            }
            _ => None,
        }
    }

    fn search_fields() -> &'static [&'static str] {
        &["username", "email"]
    }

    fn display_name(&self) -> String {
        self.username.clone()
    }

    fn validate_draft(&self) -> CrmResult<()> {
        require("username", &self.username, "Username is required")?;
        if self.username.trim().chars().count() < 4 {
            return Err(CrmError::validation(
                "username",
                "Username must be at least 4 characters",
            ));
        }
        match self.email.as_deref() {
            Some(e) if is_email(e) => {}
            _ => return Err(CrmError::validation("email", "Email is invalid")),
        }
        if let Some(password) = self.password.as_deref() {
            if password.chars().count() < 8 {
                return Err(CrmError::validation(
                    "password",
                    "Password must be at least 8 characters",
                ));
            }
        }
        if self.roles.is_empty() {
            return Err(CrmError::validation("roles", "At least one role is required"));
        }
        Ok(())
    }
}
