//! vocarise: clone a speaker's voice from a short sample and speak new text with it.

pub mod config;
pub mod errors;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use errors::{AppError, AppResult};
