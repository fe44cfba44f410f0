//! lztbot — forum notification relay and thread auto-bumper
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod forum;
pub mod extract;
pub mod render;
pub mod delivery;
pub mod storage;
pub mod engine;
pub mod dashboard;
