//! # threadscope core
//!
//! Pure logic shared by the `tscope` binary and its tests: data models,
//! conversation-tree composition, score ranking, community health metrics,
//! and the storage abstraction.
//!
//! This crate has no tokio, sqlx, HTTP, or filesystem dependencies. Anything
//! that talks to the network or a database lives in the `threadscope` crate.

pub mod compose;
pub mod health;
pub mod models;
pub mod rank;
pub mod store;
