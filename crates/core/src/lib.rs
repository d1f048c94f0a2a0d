//! Chat orchestration core: the Chat Loop, Guard Stack, Action Journal /
//! Undo Service, and the HTTP surface that fronts them.
//!
//! `main.rs` is a thin CLI entry point over this library; `bootstrap`
//! assembles [`state::AppState`] and the background tasks that keep it
//! warm, and `api` exposes it over HTTP.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
