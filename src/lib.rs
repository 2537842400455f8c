// Drive credential manager - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod prompt;
pub mod store;
