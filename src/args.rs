//! Commands and subcommands for `durakv-client`.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// Args for `durakv-client`.
#[derive(Parser)]
#[clap(author, version, about)]
#[clap(propagate_version = true)]
pub struct ClientArgs {
    /// Subcommand
    #[clap(subcommand)]
    pub command: Commands,
    /// Server listening address, default is 127.0.0.1:4000
    #[clap(short, long, global = true, value_parser)]
    pub addr: Option<SocketAddr>,
}

/// Enum type of subcommand for `durakv-client`.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Get the string value of a given string key
    Get {
        /// Key
        key: String,
    },
    /// Set the value of a string key to a string
    Set {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Remove a given key
    Delete {
        /// Key
        key: String,
    },
    /// Atomically set a group of key/value pairs, given as KEY=VALUE
    BulkSet {
        /// Key=value pairs
        #[clap(required = true)]
        items: Vec<String>,
    },
    /// Union full-text search over current values
    SearchText {
        /// Query text
        query: String,
    },
    /// Cosine-similarity embedding search over current values
    SearchEmbedding {
        /// Query text
        query: String,
        /// Number of results to return
        #[clap(long, default_value_t = 10)]
        top_k: usize,
    },
}
