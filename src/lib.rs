//! Read-optimized friendship and interaction-score views kept in Redis.
//!
//! The relational store stays authoritative. This crate keeps the cached
//! mirrors consistent on the write path, replays writes that failed through a
//! durable dead-letter queue, and rebuilds both views from scratch on demand.

pub mod api {
    pub mod error;
    pub mod success;
}
pub mod configs;
pub mod constants;
pub mod modules;
pub mod utils;

#[cfg(test)]
mod test;
