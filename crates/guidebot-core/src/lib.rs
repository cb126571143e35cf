//! Core domain and workflows for the guide-marketplace bot.
//!
//! Framework-agnostic: Telegram and the Yandex travel services live behind
//! ports (traits) implemented in the adapter crates.

pub mod actions;
pub mod alerts;
pub mod booking;
pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod outbox;
pub mod ports;
pub mod reminders;
pub mod security;
pub mod store;

pub use errors::{Error, Result};
