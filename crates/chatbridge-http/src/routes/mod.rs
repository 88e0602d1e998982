//! HTTP API route handlers.

pub mod chat;
pub mod helpers;
pub mod models;
pub mod sessions;
pub mod system;
