#![deny(missing_docs)]
//! A crash-durable, replicated, searchable key-value store.

pub mod args;
pub mod client;
pub mod cluster;
mod error;
mod index;
mod log;
mod protocol;
pub mod server;
mod store;
pub mod thread_pool;

pub use client::KvClient;
pub use error::{Result, StoreError};
pub use server::{KvServer, ShutdownHandle};
pub use store::Store;

use std::path::PathBuf;

/// Default journal path for a server started without `--data-file`.
pub fn default_data_dir() -> PathBuf {
    let mut dir = std::env::current_dir().unwrap();
    dir.push("data/durakv.log");
    dir
}
