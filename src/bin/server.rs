use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use log::{error, info, LevelFilter};

use durakv::server::KvServer;
use durakv::thread_pool::{RayonThreadPool, ThreadPool};
use durakv::{Result, Store, StoreError};

/// Args for `durakv-server`.
#[derive(Parser)]
#[clap(author, version, about)]
#[clap(propagate_version = true)]
struct ServerArgs {
    /// Host to listen on, default is 127.0.0.1
    #[clap(long, value_parser)]
    host: Option<String>,
    /// Port to listen on, default is 4000
    #[clap(long, value_parser)]
    port: Option<u16>,
    /// Path to the durable log file, default is ./data/durakv.log
    #[clap(long, value_parser)]
    data_file: Option<PathBuf>,
    /// Number of worker threads, default is the number of CPUs
    #[clap(long, value_parser)]
    threads: Option<usize>,
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4000;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    if let Err(e) = run() {
        error!("{}", e);
        exit(1);
    }
}

fn run() -> Result<()> {
    let cli = ServerArgs::parse();

    let host = cli.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = cli.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| StoreError::StringError(format!("invalid --host/--port: {}", e)))?;
    let data_file = cli.data_file.unwrap_or_else(durakv::default_data_dir);
    let threads = cli.threads.unwrap_or_else(num_cpus::get);

    info!("durakv-server {}", env!("CARGO_PKG_VERSION"));
    info!("data file: {:?}", data_file);
    info!("listening on {}", addr);

    let store = Store::open(data_file)?;
    let pool = RayonThreadPool::new(threads)?;
    let server = KvServer::new(store, pool);
    server.run(addr)
}
