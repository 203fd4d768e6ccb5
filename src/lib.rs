//! `chatsweep` — decode, classify and batch-process conversation messages.
//!
//! This crate provides the core library for reading messages out of a local
//! conversation log, decoding their opaque binary payloads without a fixed
//! schema, and applying bulk actions (save, unsave, mark-read, delete) to
//! the subset matching a set of constraints, with progress reporting and
//! cooperative cancellation.

pub mod bridge;
pub mod config;
pub mod decode;
pub mod download;
pub mod error;
pub mod model;
pub mod proto;
pub mod query;
pub mod store;
pub mod task;
