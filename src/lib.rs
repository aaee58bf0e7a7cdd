//! Botqueue - bulk comment scheduling across a pool of bot accounts
//!
//! Botqueue spreads a requested number of comments over many accounts,
//! firing one action per fixed delay, reserving accounts against
//! concurrent requests and reacting to rate limits per proxy.

pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod scheduler;
pub mod services;

pub use error::{BotqueueError, Result};
