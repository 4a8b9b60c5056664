//! # taxii2-feed
//!
//! Polls a TAXII 2 server and ingests STIX indicators into an indicator
//! database, keeping a per-collection `added_after` cursor between runs.
//!
//! - `collectors`: the TAXII 2.0/2.1 client behind the [`Taxii2Source`] trait
//! - `commands`: the fetch cycle, listings, cursor reset and scheduled polling
//! - `storage`: where the cursor and the fetched indicators are kept

pub mod collectors;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod storage;
pub mod timeutil;

#[cfg(test)]
pub(crate) mod test_support;

pub use collectors::{Taxii2FeedClient, Taxii2Source};
pub use error::FeedError;
