//! Feed Herald - RSS/Atom to Telegram announcer
//!
//! Polls a set of feeds concurrently, remembers every entry it has announced
//! in SQLite, and forwards new entries to Telegram chats through a single
//! rate-limited dispatcher shared by all feeds.

pub mod canonical;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod formatter;
pub mod orchestrator;
pub mod poller;
pub mod telegram;

pub use error::{Error, Result};
