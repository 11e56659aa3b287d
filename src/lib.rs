//! Obsidian MCP server: an MCP server fronting the Obsidian Local REST API
//! plugin.
//!
//! The hard engineering lives in the read-side serving layer — see
//! [`resources::handler::CachedResourceHandler`], which composes
//! [`cache::LruCache`], [`dedup::RequestDeduplicator`], [`batch`],
//! [`pagination`], and [`notify::NotificationBus`] into the hot path every
//! resource read traverses.

pub mod batch;
pub mod cache;
pub mod config;
pub mod dedup;
pub(crate) mod env_util;
pub mod error;
pub mod notify;
pub mod observability;
pub mod pagination;
pub mod resources;
pub mod server;
pub mod transport;
pub mod upstream;
pub mod vault;

pub use error::Error;
pub use server::McpServer;
