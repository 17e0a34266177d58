//! In-process mock of the CRM REST backend, served by axum on an
//! ephemeral port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

#[derive(Default)]
pub struct BackendState {
    pub customers: Vec<Value>,
    pub tasks: Vec<Value>,
    pub next_id: i64,
    pub list_calls: usize,
    pub last_auth: Option<String>,
}

#[derive(Clone, Default)]
pub struct Backend {
    state: Arc<Mutex<BackendState>>,
}

impl Backend {
    /// Acme (Pune) and Beta (Delhi), plus one task for Acme.
    pub fn seeded() -> Self {
        let backend = Backend::default();
        {
            let mut s = backend.lock();
            s.customers = vec![
                json!({"id": 1, "name": "Acme", "city": "Pune", "email": "ops@acme.test"}),
                json!({"id": 2, "name": "Beta", "city": "Delhi", "email": "hi@beta.test"}),
            ];
            s.tasks = vec![json!({
                "id": 1,
                "description": "Call Acme",
                "status": "Pending",
                "priority": "High",
                "customerId": 1,
                "customerName": "Acme"
            })];
            s.next_id = 3;
        }
        backend
    }

    pub fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn last_auth(&self) -> Option<String> {
        self.lock().last_auth.clone()
    }
}

fn message(status: StatusCode, text: String) -> Response {
    (status, Json(json!({ "message": text, "status": status.as_u16() }))).into_response()
}

fn record_auth(backend: &Backend, headers: &HeaderMap) {
    backend.lock().last_auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
}

async fn list_customers(State(b): State<Backend>, headers: HeaderMap) -> Json<Value> {
    record_auth(&b, &headers);
    b.lock().list_calls += 1;
    // Long enough for concurrent callers to overlap.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(Value::Array(b.lock().customers.clone()))
}

async fn customers_by_city(
    State(b): State<Backend>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let city = q.get("city").cloned().unwrap_or_default().to_lowercase();
    let found: Vec<Value> = b
        .lock()
        .customers
        .iter()
        .filter(|c| c["city"].as_str().map(str::to_lowercase) == Some(city.clone()))
        .cloned()
        .collect();
    Json(Value::Array(found))
}

async fn get_customer(State(b): State<Backend>, Path(id): Path<i64>) -> Response {
    let found = b.lock().customers.iter().find(|c| c["id"] == id).cloned();
    match found {
        Some(c) => Json(c).into_response(),
        None => message(StatusCode::NOT_FOUND, format!("Customer not found with id: {}", id)),
    }
}

async fn create_customer(State(b): State<Backend>, Json(mut body): Json<Value>) -> Response {
    if body["name"].as_str().map_or(true, str::is_empty) {
        return message(StatusCode::BAD_REQUEST, "Name is required".to_string());
    }
    let mut s = b.lock();
    body["id"] = json!(s.next_id);
    s.next_id += 1;
    s.customers.push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn update_customer(
    State(b): State<Backend>,
    Path(id): Path<i64>,
    Json(mut body): Json<Value>,
) -> Response {
    let mut s = b.lock();
    match s.customers.iter_mut().find(|c| c["id"] == id) {
        Some(slot) => {
            body["id"] = json!(id);
            *slot = body.clone();
            Json(body).into_response()
        }
        None => message(StatusCode::NOT_FOUND, format!("Customer not found with id: {}", id)),
    }
}

async fn delete_customer(State(b): State<Backend>, Path(id): Path<i64>) -> Response {
    let mut s = b.lock();
    let before = s.customers.len();
    s.customers.retain(|c| c["id"] != id);
    if s.customers.len() == before {
        // Plain-text body, as some endpoints answer.
        return (StatusCode::NOT_FOUND, "Customer not found").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_tasks(State(b): State<Backend>) -> Json<Value> {
    Json(Value::Array(b.lock().tasks.clone()))
}

/// Stores the update but answers without the joined `customerName`,
/// which only the list endpoint fills in.
async fn update_task(
    State(b): State<Backend>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let mut s = b.lock();
    match s.tasks.iter_mut().find(|t| t["id"] == id) {
        Some(slot) => {
            let customer_name = slot["customerName"].clone();
            let mut stored = body.clone();
            stored["id"] = json!(id);
            stored["customerName"] = customer_name;
            *slot = stored;
            let mut reply = body;
            reply["id"] = json!(id);
            Json(reply).into_response()
        }
        None => message(StatusCode::NOT_FOUND, format!("Task not found with id: {}", id)),
    }
}

async fn global_search(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let needle = q.get("query").cloned().unwrap_or_default().to_lowercase();
    let all = vec![
        json!({"id": 1, "name": "Acme", "city": "Pune", "email": "ops@acme.test"}),
        json!({"id": 4, "dealName": "Acme renewal", "stage": "Proposal", "customerId": 1}),
        json!({"id": 1, "description": "Call Acme", "status": "Pending", "dueDate": "2024-05-01"}),
        json!({"id": 9, "content": "Acme wants a discount", "customerId": 1}),
        json!({"id": 2, "name": "Jane Acme", "position": "CTO", "customerId": 1}),
        json!({"id": 3, "username": "acme-admin", "email": "admin@acme.test"}),
    ];
    let hits: Vec<Value> = all
        .into_iter()
        .filter(|v| v.to_string().to_lowercase().contains(&needle))
        .collect();
    Json(Value::Array(hits))
}

async fn login(Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default().to_string();
    if body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, "Invalid username or password").into_response();
    }
    Json(json!({
        "token": format!("tok-{}", username),
        "user": {"id": 1, "username": username, "roles": ["USER"]}
    }))
    .into_response()
}

async fn me(headers: HeaderMap) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    match auth.strip_prefix("Bearer tok-") {
        Some(username) => Json(json!({"id": 1, "username": username, "roles": ["USER"]})).into_response(),
        None => message(StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
    }
}

pub fn router(backend: Backend) -> Router {
    Router::new()
        .route("/api/customers/allCustomers", get(list_customers))
        .route("/api/customers/byCityName", get(customers_by_city))
        .route("/api/customers/getByCustomerId/{id}", get(get_customer))
        .route("/api/customers/create/customer", post(create_customer))
        .route("/api/customers/update/{id}", put(update_customer))
        .route("/api/customers/delete/{id}", axum::routing::delete(delete_customer))
        .route("/api/tasks/getAllTask", get(list_tasks))
        .route("/api/tasks/update/{id}", put(update_task))
        .route("/api/search/global", get(global_search))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .with_state(backend)
}

/// Serves `backend` on 127.0.0.1 and returns the API base URL.
pub async fn spawn(backend: Backend) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(backend)).await.unwrap();
    });
    format!("http://{}/api", addr)
}
