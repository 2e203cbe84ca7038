//! tabletalk — conversational SQL service for the fraud transactions
//! dashboard.
//!
//! Free-text questions come in over HTTP; an LLM drafts a candidate SQL
//! statement; a conservative read-only gate validates it; the database
//! executes it under a row/time budget; a second LLM call explains the
//! result. This library exposes the core modules for use in integration
//! tests and custom binaries.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod query;
pub mod safety;
pub mod server;
