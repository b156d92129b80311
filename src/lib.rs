//! NutriTrack offline worker library
//!
//! A cache-first request interceptor with versioned cache generations:
//! install-time pre-population, activation-time cleanup of stale generations
//! and opportunistic caching of successful same-origin responses.

pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod worker;
