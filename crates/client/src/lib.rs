//! slawatch_client - the console's cache consistency engine, its HTTP and
//! real-time transports, and the `slawatch` CLI built on top of them.

pub mod cli;
pub mod client;
pub mod console;
pub mod engine;
pub mod error;
pub mod output;

pub use client::SlawatchClient;
pub use console::Console;
pub use error::{ClientError, Result};
