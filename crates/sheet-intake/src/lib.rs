pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod mapping;
pub mod server;
pub mod sheets;
