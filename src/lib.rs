pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod navigation;
pub mod services;
pub mod storage;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use app::{router, AppState};
