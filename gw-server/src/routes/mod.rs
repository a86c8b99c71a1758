pub mod admin;
pub mod chat;
pub mod health;
pub mod mcp;
pub mod models;
pub mod sessions;
