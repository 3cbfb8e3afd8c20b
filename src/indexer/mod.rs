//! Indexer integration module
//!
//! This module provides the client and types for the indexer and token list services.
//! The indexer lists live block builders, the token service maps layer-2 token indexes
//! to token metadata, and block builders quote the fee for the next transfer.

/// HTTP client for the indexer and token list
mod client;
/// Type definitions for indexer data structures
mod types;

pub use client::{BlockBuilderDirectory, IndexerClient, TokenSource};
pub use types::*;
