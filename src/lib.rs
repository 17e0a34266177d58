//! # CRM Client
//!
//! Entity collection client for a CRM REST backend.
//!
//! The crate keeps local collections of customers, deals, tasks, contacts,
//! notes and users consistent with the server, caches and de-duplicates
//! reads, and derives filtered and sorted views on the client.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Collection   │──▶│ CachedClient │──▶│  HttpClient  │──▶│ REST API │
//! │ Store (kind) │   │ TTL + dedup  │   │  (reqwest)   │   │          │
//! └──────┬───────┘   └──────────────┘   └──────────────┘   └──────────┘
//!        │
//!        ▼
//! ┌──────────────┐   ┌──────────────┐
//! │ Filter/Sort  │──▶│  CLI (crm)   │
//! │  pipeline    │   │  or embedder │
//! └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crm login alice                       # prompts for the password
//! crm list customers --where city=Pune --sort name --desc
//! crm create tasks --data '{"description":"Call Acme","dueDate":"2024-05-01"}'
//! crm search acme
//! crm logout
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Entity kinds and the `Entity` trait |
//! | [`api`] | Remote entity client trait and HTTP implementation |
//! | [`cache`] | Response cache with TTL and in-flight de-duplication |
//! | [`cached`] | Caching decorator over a remote client |
//! | [`memory`] | In-memory remote client |
//! | [`store`] | Per-kind collection store |
//! | [`filter`] | Client-side filter/sort pipeline |
//! | [`search`] | Global search and result classification |
//! | [`session`] | Persisted login and inactivity logout |
//! | [`notify`] | Success/failure notifications |
//! | [`context`] | Process-wide context holding every store |
//! | [`commands`] | CLI command implementations |

pub mod api;
pub mod cache;
pub mod cached;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod memory;
pub mod models;
pub mod notify;
pub mod search;
pub mod session;
pub mod store;
