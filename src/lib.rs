//! Agent Knowledge Server - shared knowledge store for multi-agent development.
//!
//! Agents post short updates tagged by feature, branch and agent name, and
//! read them back with simple filters. Entries live in one `SQLite` table.

pub mod config;
pub mod display;
pub mod server;
pub mod store;
