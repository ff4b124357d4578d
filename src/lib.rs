pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod utils;
pub mod web;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
