//! Message log stores: the query contract plus reference implementations.
//!
//! The host application's real store (a relational table of raw message
//! records) stays external; this module owns only its query contract
//! ([`MessageLog`]) and two reference implementations — an in-memory log
//! for tests and adapters, and a JSON-lines file log for the CLI.

pub mod file;
pub mod log;
pub mod memory;

#[cfg(test)]
pub(crate) mod testfix;

pub use file::FileLog;
pub use log::{MessageLog, MessagePredicate};
pub use memory::MemoryLog;
