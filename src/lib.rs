//! liveboard - Real-time collaborative board ordering
//!
//! The core of a collaborative kanban tool: multiple users drag tasks
//! between columns and reorder columns while a persisted integer
//! position per member stays a consistent total order under concurrent
//! mutations, and every viewer of a board sees the changes live.
//!
//! # Core Concepts
//!
//! - **Dense order**: within one parent (tasks in a column, columns in
//!   a board) positions are always exactly `0..N-1` between mutations
//! - **Relocate / Reindex**: the two atomic ordering primitives
//! - **Hub**: per-connection event streams, per-board membership,
//!   fan-out that excludes the originator, transient presence
//! - **Mirror**: the client's optimistic tree, reconciled against the
//!   authoritative event stream
//!
//! # Module Organization
//!
//! - `config`: configuration loading from `.liveboard.toml`
//! - `error`: error types and result alias
//! - `model`: boards, columns, tasks, ids, presence, activity
//! - `position`: ordered-collection arithmetic shared by server and client
//! - `storage`: persistence and authorization collaborator contracts,
//!   plus the in-memory arena store
//! - `events`: broadcast event taxonomy (the wire contract)
//! - `engine`: the authorized, atomic board mutation engine
//! - `hub`: presence and broadcast hub
//! - `mirror`: client-side reconciliation store
//! - `telemetry`: opt-in tracing bootstrap

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hub;
pub mod mirror;
pub mod model;
pub mod position;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};
