//! Recstore Core - record storage layer of a property graph kernel
//!
//! Maps nodes, relationships, tokens and property values onto fixed-size
//! and variable-size records living in page-cached files:
//! - Fixed-size record stores with explicit id allocation and reuse
//! - Dynamic record chains for strings, arrays and overflowing label sets
//! - Inline/dynamic node label codec
//! - Lock-free highest committed transaction tracking
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               GraphStores                   │
//! │  (nodes, labels, rels, tokens, properties)  │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │         Record Stores (CommonStore)         │
//! │  (formats, id sequences, dynamic chains)    │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │               Page Cache                    │
//! │      (paged files, clock eviction)          │
//! └─────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod page_cache;
pub mod storage;

pub use config::StoreConfig;
pub use error::{Error, Result};
