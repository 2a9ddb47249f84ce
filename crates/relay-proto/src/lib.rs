//! Core of the Mopidy → Slack relay.
//!
//! Everything that can run without a live media daemon lives here: the data
//! model, configuration, the enrichment/formatting/dispatch pipeline for
//! playback events, the chat command handlers and the HTTP side-channel
//! clients.  The `relay-daemon` binary wires these to real connections.

pub mod commands;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod format;
pub mod handler;
pub mod models;
pub mod platform;
pub mod queue;
pub mod slack;
pub mod stats;

pub use error::{RelayError, Result};
