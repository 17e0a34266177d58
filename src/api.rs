//! Remote entity client: the HTTP boundary to the CRM backend.
//!
//! Defines the [`RemoteEntityClient`] trait (list / get / create / update /
//! delete per entity kind) and [`HttpClient`], its `reqwest`
//! implementation. Every call is a single attempt: failures surface
//! immediately as [`CrmError::Transport`] (non-2xx) or
//! [`CrmError::Network`] (no response). Retrying is left to the caller.
//!
//! # Endpoints
//!
//! Paths are relative to `[api].base_url` and differ per kind:
//!
//! | Kind | List | Get / Update / Delete | Create |
//! |------|------|-----------------------|--------|
//! | customers | `customers/allCustomers` | `customers/getByCustomerId/{id}`, `customers/update/{id}`, `customers/delete/{id}` | `customers/create/customer` |
//! | deals | `deals/getAllDeals` | `deals/getDealBYId/{id}`, `deals/updateDealById/{id}`, `deals/delete/{id}` | `deals/createDeal` |
//! | tasks | `tasks/getAllTask` | `tasks/getTaskById/{id}`, `tasks/update/{id}`, `tasks/delete/{id}` | `tasks/createTask` |
//! | contacts | `contacts/allContact` | `contacts/{id}` | `contacts/createContact` |
//! | notes | `notes/allNotes` | `notes/{id}` | `notes/create/note` |
//! | users | `users/getAllUsers` | `users/{id}` | `users/createUser` |
//!
//! Authenticated requests carry `Authorization: Bearer <token>` once a
//! token has been set; before that the header is omitted.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{CrmError, CrmResult};
use crate::models::{Entity, EntityId, EntityKind, User};

/// Secondary list lookups served by dedicated endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Name search (customers).
    Name(String),
    City(String),
    State(String),
    Country(String),
    /// Records owned by a user (customers).
    Owner(EntityId),
    /// Users holding a role.
    Role(String),
}

/// Parameters of a list call.
///
/// `params` are passed through as query-string pairs (deals accept
/// `customerId`, `sortBy`, `sortOrder`). `lookup` switches to one of the
/// secondary endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub params: BTreeMap<String, String>,
    pub lookup: Option<Lookup>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn lookup(lookup: Lookup) -> Self {
        Self {
            params: BTreeMap::new(),
            lookup: Some(lookup),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Stable textual key: the same query always yields the same key.
    pub fn key(&self) -> String {
        let mut key = match &self.lookup {
            None => "all".to_string(),
            Some(Lookup::Name(v)) => format!("name={}", v),
            Some(Lookup::City(v)) => format!("city={}", v),
            Some(Lookup::State(v)) => format!("state={}", v),
            Some(Lookup::Country(v)) => format!("country={}", v),
            Some(Lookup::Owner(id)) => format!("owner={}", id),
            Some(Lookup::Role(v)) => format!("role={}", v),
        };
        for (k, v) in &self.params {
            key.push_str(&format!("&{}={}", k, v));
        }
        key
    }
}

/// Per-kind CRUD operations against the backend.
///
/// Implemented by [`HttpClient`] for every [`Entity`] type, by
/// [`CachedClient`](crate::cached::CachedClient) as a caching decorator,
/// and by in-memory fakes in tests.
#[async_trait]
pub trait RemoteEntityClient<E: Entity>: Send + Sync {
    async fn list_all(&self, query: &ListQuery) -> CrmResult<Vec<E>>;

    async fn get_by_id(&self, id: &EntityId) -> CrmResult<E>;

    /// Persists a draft; the returned entity carries the server-assigned
    /// identifier and defaults.
    async fn create(&self, draft: &E) -> CrmResult<E>;

    async fn update(&self, id: &EntityId, draft: &E) -> CrmResult<E>;

    async fn delete(&self, id: &EntityId) -> CrmResult<()>;
}

#[async_trait]
impl<E: Entity, C: RemoteEntityClient<E> + ?Sized> RemoteEntityClient<E> for Arc<C> {
    async fn list_all(&self, query: &ListQuery) -> CrmResult<Vec<E>> {
        (**self).list_all(query).await
    }
    async fn get_by_id(&self, id: &EntityId) -> CrmResult<E> {
        (**self).get_by_id(id).await
    }
    async fn create(&self, draft: &E) -> CrmResult<E> {
        (**self).create(draft).await
    }
    async fn update(&self, id: &EntityId, draft: &E) -> CrmResult<E> {
        (**self).update(id, draft).await
    }
    async fn delete(&self, id: &EntityId) -> CrmResult<()> {
        RemoteEntityClient::<E>::delete(&**self, id).await
    }
}

/// Relative endpoint templates for one kind. `{id}` is substituted.
struct Endpoints {
    list: &'static str,
    get: &'static str,
    create: &'static str,
    update: &'static str,
    delete: &'static str,
}

fn endpoints(kind: EntityKind) -> Endpoints {
    match kind {
        EntityKind::Customer => Endpoints {
            list: "customers/allCustomers",
            get: "customers/getByCustomerId/{id}",
            create: "customers/create/customer",
            update: "customers/update/{id}",
            delete: "customers/delete/{id}",
        },
        EntityKind::Deal => Endpoints {
            list: "deals/getAllDeals",
            get: "deals/getDealBYId/{id}",
            create: "deals/createDeal",
            update: "deals/updateDealById/{id}",
            delete: "deals/delete/{id}",
        },
        EntityKind::Task => Endpoints {
            list: "tasks/getAllTask",
            get: "tasks/getTaskById/{id}",
            create: "tasks/createTask",
            update: "tasks/update/{id}",
            delete: "tasks/delete/{id}",
        },
        EntityKind::Contact => Endpoints {
            list: "contacts/allContact",
            get: "contacts/{id}",
            create: "contacts/createContact",
            update: "contacts/{id}",
            delete: "contacts/{id}",
        },
        EntityKind::Note => Endpoints {
            list: "notes/allNotes",
            get: "notes/{id}",
            create: "notes/create/note",
            update: "notes/{id}",
            delete: "notes/{id}",
        },
        EntityKind::User => Endpoints {
            list: "users/getAllUsers",
            get: "users/{id}",
            create: "users/createUser",
            update: "users/{id}",
            delete: "users/{id}",
        },
    }
}

fn with_id(template: &str, id: &EntityId) -> String {
    template.replace("{id}", &id.to_string())
}

/// Resolves a list query to `(path, query pairs)` for `kind`.
fn list_target(kind: EntityKind, query: &ListQuery) -> CrmResult<(String, Vec<(String, String)>)> {
    let mut pairs: Vec<(String, String)> = query
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let path = match (&query.lookup, kind) {
        (None, _) => endpoints(kind).list.to_string(),
        (Some(Lookup::Name(v)), EntityKind::Customer) => {
            pairs.push(("name".to_string(), v.clone()));
            "customers/searchByName".to_string()
        }
        (Some(Lookup::City(v)), EntityKind::Customer) => {
            pairs.push(("city".to_string(), v.clone()));
            "customers/byCityName".to_string()
        }
        (Some(Lookup::State(v)), EntityKind::Customer) => {
            pairs.push(("state".to_string(), v.clone()));
            "customers/byStateName".to_string()
        }
        (Some(Lookup::Country(v)), EntityKind::Customer) => {
            pairs.push(("country".to_string(), v.clone()));
            "customers/byCountryName".to_string()
        }
        (Some(Lookup::Owner(id)), EntityKind::Customer) => {
            id.validate()?;
            format!("customers/byUser/{}", id)
        }
        (Some(Lookup::Role(v)), EntityKind::User) => {
            pairs.push(("role".to_string(), v.clone()));
            "users/byRole".to_string()
        }
        (Some(other), _) => {
            return Err(CrmError::validation(
                "lookup",
                format!("{:?} is not supported for {}", other, kind),
            ))
        }
    };
    Ok((path, pairs))
}

/// Response of `auth/login` and `auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

/// `reqwest`-backed client for the CRM REST API.
///
/// Cheap to clone; clones share the connection pool and the bearer token.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> CrmResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CrmError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attaches (or with `None`, removes) the bearer token for all
    /// subsequent requests.
    pub fn set_token(&self, token: Option<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%method, %url, "crm request");
        let builder = self.http.request(method, url);
        let token = self.token.read().unwrap_or_else(|e| e.into_inner());
        match token.as_deref() {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> CrmResult<Response> {
        let response = builder.send().await.map_err(network_error)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> CrmResult<T> {
        let response = Self::send(builder).await?;
        let bytes = response.bytes().await.map_err(network_error)?;
        serde_json::from_slice(&bytes).map_err(CrmError::from)
    }

    /// `POST auth/login`.
    pub async fn login(&self, username: &str, password: &str) -> CrmResult<AuthResponse> {
        let body = AuthRequest {
            username,
            password,
            email: None,
        };
        Self::send_json(self.request(Method::POST, "auth/login").json(&body)).await
    }

    /// `POST auth/register`. New accounts receive the default role.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> CrmResult<AuthResponse> {
        let body = AuthRequest {
            username,
            password,
            email,
        };
        Self::send_json(self.request(Method::POST, "auth/register").json(&body)).await
    }

    /// `GET auth/me`: the profile behind the current token.
    pub async fn me(&self) -> CrmResult<User> {
        Self::send_json(self.request(Method::GET, "auth/me")).await
    }

    /// `GET search/global?query=...`: untyped matches across all kinds.
    pub async fn global_search(&self, query: &str) -> CrmResult<Vec<serde_json::Value>> {
        Self::send_json(
            self.request(Method::GET, "search/global")
                .query(&[("query", query)]),
        )
        .await
    }
}

fn network_error(e: reqwest::Error) -> CrmError {
    CrmError::Network(e.to_string())
}

/// Turns a non-2xx response into [`CrmError::Transport`].
///
/// The message is the body's `message` field when the body is a JSON
/// object carrying one, the raw body otherwise, and the status reason
/// when the body is empty.
async fn check_status(response: Response) -> CrmResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CrmError::Transport {
        status: status.as_u16(),
        message: extract_message(status, &body),
    })
}

fn extract_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
        if let Some(serde_json::Value::String(msg)) = map.get("message") {
            return msg.clone();
        }
    }
    trimmed.to_string()
}

#[async_trait]
impl<E: Entity> RemoteEntityClient<E> for HttpClient {
    async fn list_all(&self, query: &ListQuery) -> CrmResult<Vec<E>> {
        let (path, pairs) = list_target(E::KIND, query)?;
        let mut builder = self.request(Method::GET, &path);
        if !pairs.is_empty() {
            builder = builder.query(&pairs);
        }
        Self::send_json(builder).await
    }

    async fn get_by_id(&self, id: &EntityId) -> CrmResult<E> {
        id.validate()?;
        let path = with_id(endpoints(E::KIND).get, id);
        Self::send_json(self.request(Method::GET, &path)).await
    }

    async fn create(&self, draft: &E) -> CrmResult<E> {
        let path = endpoints(E::KIND).create;
        Self::send_json(self.request(Method::POST, path).json(draft)).await
    }

    async fn update(&self, id: &EntityId, draft: &E) -> CrmResult<E> {
        id.validate()?;
        let path = with_id(endpoints(E::KIND).update, id);
        Self::send_json(self.request(Method::PUT, &path).json(draft)).await
    }

    /// A `204 No Content` (or any 2xx) is success; a body, if any, is ignored.
    async fn delete(&self, id: &EntityId) -> CrmResult<()> {
        id.validate()?;
        let path = with_id(endpoints(E::KIND).delete, id);
        Self::send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}
