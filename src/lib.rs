//! keylimit - Distributed Per-Key Rate Limiting
//!
//! This crate enforces per-key request quotas across any number of processes
//! sharing one Redis. Four algorithms are available: fixed window, sliding
//! window, token bucket, and leaky bucket. Each operation is a single atomic
//! server-side Lua script, so there is no client-side locking and no
//! read-modify-write race between processes; the calling client supplies the
//! wall-clock time the scripts reason with.

pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod script;
