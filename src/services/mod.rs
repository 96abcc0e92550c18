// src/services/mod.rs
pub mod api;
pub mod chat;
pub mod location;
pub mod notifier;
pub mod storage;
