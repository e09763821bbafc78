//! Lobby Presence Library
//!
//! Presence and session synchronization for a multiplayer game lobby: unique
//! handles, a live roster shared through a realtime store, and cleanup of
//! abandoned sessions.
//!
//! # Features
//!
//! - `metrics` - HTTP endpoint serving lobby metrics (enabled by default)
//! - `file_cache` - JSON-file backed local session cache (enabled by default)

pub mod app;
pub mod cache;
pub mod config;
pub mod handle;
pub mod metrics;
pub mod render;
pub mod roster;
pub mod session;
pub mod skin;
pub mod store;
pub mod util;
