//! Engram — a local-first, end-to-end-encrypted memory and secrets layer
//! for AI assistants, spoken to over MCP (stdio JSON-RPC).
//!
//! The engine fuses a transactional SQLite store with an on-disk vector
//! index ([sqlite-vec](https://github.com/asg017/sqlite-vec)), a DLP
//! sanitization pass that runs before any text is embedded or persisted,
//! an append-only encrypted sync journal with strict sequence ordering,
//! and a multi-device key hierarchy (master key → vault key → per-record
//! AES-256-GCM) with Shamir recovery kits and RSA-4096 device
//! authorization.
//!
//! # Modules
//!
//! - [`config`] — TOML configuration plus environment overrides
//! - [`crypto`] — envelopes, checksums, blind indexes, Shamir, BIP39, RSA
//! - [`db`] — SQLite bootstrap, schema, migrations, health checks
//! - [`dlp`] — credential redaction pipeline
//! - [`embedding`] — the opaque `Embedder` handle
//! - [`memory`] — the memory store: CRUD, KNN search, sync journal
//! - [`secrets`] — encrypted secrets store
//! - [`sync`] — push/pull engines and device authorization
//! - [`indexing`] / [`watcher`] — session files → searchable memories
//! - [`tools`] — the twelve-tool MCP facade

pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod dlp;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod keys;
pub mod keyvault;
pub mod memory;
pub mod recovery;
pub mod secrets;
pub mod server;
pub mod sync;
pub mod tools;
pub mod watcher;
