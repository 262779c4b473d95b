//! Services Layer
//!
//! Business logic called by the scheduler. Services hold no state of their
//! own; they work against the shared [`AppState`](crate::state::AppState).
//!
//! # Services
//!
//! - `IngestService` - Fetch, reconcile and persist one entity

pub mod ingest_service;

pub use ingest_service::{EntityOutcome, IngestService};
