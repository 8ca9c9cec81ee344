//! Client-side data synchronization for a bug and suggestion board.
//!
//! Reads go through a shared [`cache::QueryCache`] that deduplicates requests
//! and serves fresh entries; writes go through the
//! [`mutations::MutationCoordinator`], which invalidates the keys they touch.

pub mod app;
pub mod board;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod logging;
pub mod mutations;
pub mod query;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::BoardError;
