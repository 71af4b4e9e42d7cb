//! # slack-qa
//!
//! Incremental Slack channel ingestion and retrieval-augmented Q&A.
//!
//! The ingestion pipeline ([`ingest`]) fetches channel history from the
//! Slack Web API ([`slack`]), normalizes message text ([`clean`]), embeds
//! the resulting documents ([`embedding`]), writes them to a per-channel
//! Qdrant collection ([`qdrant`]), and records progress in a persisted
//! per-channel cursor ([`cursor`]) so re-runs only fetch what is new.
//! The Q&A pipeline ([`qa`]) answers questions against the same index.

pub mod clean;
pub mod config;
pub mod cursor;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod qa;
pub mod qdrant;
pub mod server;
pub mod slack;
pub mod ts;
