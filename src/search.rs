//! Global search across entity kinds.
//!
//! `GET search/global?query=...` returns one flat, unlabelled list of
//! customers, deals, tasks, contacts, users and notes. [`classify`] infers
//! each result's kind and produces a normalized [`SearchHit`].
//!
//! # Classification order
//!
//! The first rule that matches wins:
//!
//! | # | Rule | Kind |
//! |---|------|------|
//! | 1 | explicit `type` or `kind` field naming a kind | that kind |
//! | 2 | `dealName` | deal |
//! | 3 | `username` | user |
//! | 4 | `description` together with `dueDate` or `status` | task |
//! | 5 | `content` | note |
//! | 6 | `position`, or `name` together with `customerId` | contact |
//! | 7 | `name` | customer |
//!
//! Results matching none of these are skipped with a warning.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::api::HttpClient;
use crate::error::CrmResult;
use crate::models::{EntityId, EntityKind};

/// One display-ready search match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub name: String,
    pub id: Option<EntityId>,
}

const NOTE_PREVIEW: usize = 60;

fn has(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(v) if !v.is_null())
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn id_of(obj: &Map<String, Value>) -> Option<EntityId> {
    match obj.get("id")? {
        Value::Number(n) => n.as_i64().map(EntityId::Int),
        Value::String(s) => Some(EntityId::from(s.as_str())),
        _ => None,
    }
}

fn infer_kind(obj: &Map<String, Value>) -> Option<EntityKind> {
    for key in ["type", "kind"] {
        if let Some(Value::String(s)) = obj.get(key) {
            if let Ok(kind) = s.parse::<EntityKind>() {
                return Some(kind);
            }
        }
    }
    if has(obj, "dealName") {
        return Some(EntityKind::Deal);
    }
    if has(obj, "username") {
        return Some(EntityKind::User);
    }
    if has(obj, "description") && (has(obj, "dueDate") || has(obj, "status")) {
        return Some(EntityKind::Task);
    }
    if has(obj, "content") {
        return Some(EntityKind::Note);
    }
    if has(obj, "position") || (has(obj, "name") && has(obj, "customerId")) {
        return Some(EntityKind::Contact);
    }
    if has(obj, "name") {
        return Some(EntityKind::Customer);
    }
    None
}

fn display_name(kind: EntityKind, obj: &Map<String, Value>) -> String {
    let name = match kind {
        EntityKind::Deal => text(obj, "dealName"),
        EntityKind::User => text(obj, "username"),
        EntityKind::Task => text(obj, "description"),
        EntityKind::Note => text(obj, "content").map(|c| match c.char_indices().nth(NOTE_PREVIEW) {
            Some((cut, _)) => format!("{}...", &c[..cut]),
            None => c,
        }),
        EntityKind::Contact | EntityKind::Customer => text(obj, "name"),
    };
    name.or_else(|| text(obj, "name"))
        .unwrap_or_else(|| format!("Unnamed {}", kind.label().to_lowercase()))
}

/// Infers the kind of one raw search result. `None` when the value is not
/// an object or matches no rule.
pub fn classify(value: &Value) -> Option<SearchHit> {
    let obj = value.as_object()?;
    let kind = infer_kind(obj)?;
    Some(SearchHit {
        kind,
        name: display_name(kind, obj),
        id: id_of(obj),
    })
}

/// Classifies every result, dropping the ones that cannot be classified.
pub fn classify_all(values: &[Value]) -> Vec<SearchHit> {
    values
        .iter()
        .filter_map(|v| {
            let hit = classify(v);
            if hit.is_none() {
                warn!(result = %v, "unclassifiable search result skipped");
            }
            hit
        })
        .collect()
}

/// Runs a global search. An empty query returns no hits without a request.
pub async fn global_search(client: &HttpClient, query: &str) -> CrmResult<Vec<SearchHit>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let raw = client.global_search(query).await?;
    Ok(classify_all(&raw))
}
