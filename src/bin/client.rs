use std::net::SocketAddr;
use std::process::exit;

use clap::Parser;
use log::{error, LevelFilter};

use durakv::args::{ClientArgs, Commands};
use durakv::{KvClient, Result, StoreError};

const DEFAULT_ADDR: &str = "127.0.0.1:4000";

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    if let Err(e) = run() {
        error!("{}", e);
        exit(1);
    }
}

fn run() -> Result<()> {
    let cli = ClientArgs::parse();
    let addr: SocketAddr = cli.addr.unwrap_or(DEFAULT_ADDR.parse().unwrap());
    let mut client = KvClient::connect(addr)?;

    match cli.command {
        Commands::Get { key } => match client.get(key)? {
            Some(value) => println!("{}", value),
            None => println!("Key not found"),
        },
        Commands::Set { key, value } => client.set(key, value)?,
        Commands::Delete { key } => {
            if !client.delete(key)? {
                println!("Key not found");
            }
        }
        Commands::BulkSet { items } => {
            let parsed = items
                .iter()
                .map(|item| parse_pair(item))
                .collect::<Result<Vec<_>>>()?;
            client.bulk_set(parsed)?;
        }
        Commands::SearchText { query } => {
            for key in client.search_full_text(query)? {
                println!("{}", key);
            }
        }
        Commands::SearchEmbedding { query, top_k } => {
            for (key, score) in client.search_embedding(query, top_k)? {
                println!("{}\t{:.4}", key, score);
            }
        }
    }

    Ok(())
}

fn parse_pair(item: &str) -> Result<(String, String)> {
    item.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| StoreError::StringError(format!("expected KEY=VALUE, got {:?}", item)))
}
