//! The TCP dispatcher (C4): accepts connections, speaks the
//! newline-delimited JSON protocol, and dispatches each connection onto a
//! [`crate::thread_pool::ThreadPool`].
//!
//! Shutdown is cooperative: [`KvServer::run`] polls `accept` with a short
//! timeout rather than blocking forever, so a shared `AtomicBool` flipped by
//! another thread is noticed promptly. As a belt-and-suspenders measure the
//! shutdown path also opens (and immediately drops) one connection to its
//! own listening address, in case the listener is parked past its poll
//! window.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::StoreError;
use crate::protocol::{Request, Response};
use crate::store::Store;
use crate::thread_pool::ThreadPool;

/// How long `accept` blocks before the server re-checks its shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// A running (or about-to-run) server bound to one [`Store`] and dispatching
/// connections onto a pool `P`.
pub struct KvServer<P: ThreadPool> {
    store: Store,
    pool: P,
    shutdown: Arc<AtomicBool>,
}

/// A handle that can ask a running [`KvServer`] to stop accepting new
/// connections. Cloning shares the same underlying flag.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: std::net::SocketAddr,
}

impl ShutdownHandle {
    /// Request shutdown. Flips the flag and best-effort self-connects so a
    /// listener currently blocked in `accept` wakes up promptly instead of
    /// waiting out the next poll interval.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect_timeout(&self.addr, Duration::from_millis(200));
    }

    /// The address this handle's self-connect targets.
    pub fn addr(&self) -> std::net::SocketAddr {
        self.addr
    }
}

impl<P: ThreadPool> KvServer<P> {
    /// Create a server over `store`, dispatching each connection as a job on
    /// `pool`.
    pub fn new(store: Store, pool: P) -> Self {
        KvServer {
            store,
            pool,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind `addr` and serve until shut down via a handle obtained
    /// elsewhere, blocking the calling thread. Most callers instead want
    /// [`KvServer::run_with_shutdown`], which hands back the handle before
    /// blocking.
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> crate::error::Result<()> {
        let (_, run) = self.prepare(addr)?;
        run()
    }

    /// Bind `addr`, return a [`ShutdownHandle`] for it immediately, and a
    /// closure the caller runs (typically on the current thread) to serve
    /// until that handle's `shutdown()` is called.
    pub fn run_with_shutdown<A: ToSocketAddrs>(
        self,
        addr: A,
    ) -> crate::error::Result<(ShutdownHandle, impl FnOnce() -> crate::error::Result<()>)> {
        self.prepare(addr)
    }

    fn prepare<A: ToSocketAddrs>(
        self,
        addr: A,
    ) -> crate::error::Result<(ShutdownHandle, impl FnOnce() -> crate::error::Result<()>)> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let handle = ShutdownHandle {
            flag: self.shutdown.clone(),
            addr: local_addr,
        };

        let store = self.store;
        let pool = self.pool;
        let shutdown = self.shutdown;

        let run = move || -> crate::error::Result<()> {
            info!("listening on {}", local_addr);
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                match listener.accept() {
                    Ok((stream, peer)) => {
                        if shutdown.load(Ordering::SeqCst) {
                            // The belt-and-suspenders self-connect; drop it.
                            continue;
                        }
                        debug!("accepted connection from {}", peer);
                        let store = store.clone();
                        pool.spawn(move || {
                            if let Err(e) = handle_connection(store, stream) {
                                error!("connection error: {}", e);
                            }
                        });
                    }
                    Err(e) if would_block(&e) => {
                        std::thread::sleep(ACCEPT_POLL);
                        continue;
                    }
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                }
            }
        };

        Ok((handle, run))
    }
}

fn would_block(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
}

fn handle_connection(store: Store, stream: TcpStream) -> crate::error::Result<()> {
    let peer = stream.peer_addr()?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = match reader.read_line(&mut line) {
            Ok(n) => n,
            Err(e) => {
                error!("read error from {}: {}", peer, e);
                let _ = write_response(&mut writer, &Response::from_error(&StoreError::Io(e)));
                return Ok(());
            }
        };
        if bytes_read == 0 {
            debug!("connection from {} closed", peer);
            return Ok(());
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }

        let response = dispatch(&store, trimmed);
        if let Err(e) = write_response(&mut writer, &response) {
            error!("write error to {}: {}", peer, e);
            return Ok(());
        }
    }
}

fn dispatch(store: &Store, line: &str) -> Response {
    let request = match Request::parse(line) {
        Ok(req) => req,
        Err(e) => return Response::from_error(&e),
    };

    let result = match request {
        Request::Get { key } => store.get(&key).map(Response::get_result),
        Request::Set { key, value } => store.set(key, value).map(|()| Response::ok()),
        Request::Delete { key } => store.delete(&key).map(Response::deleted),
        Request::BulkSet { items } => store.bulk_set(items).map(|()| Response::ok()),
        Request::SearchText { query } => store
            .search_full_text(&query)
            .map(Response::search_text_result),
        Request::SearchEmbedding { query, top_k } => store
            .search_embedding(&query, top_k)
            .map(Response::search_embedding_result),
    };

    result.unwrap_or_else(|e| Response::from_error(&e))
}

fn write_response(stream: &mut TcpStream, response: &Response) -> std::io::Result<()> {
    stream.write_all(response.to_line().as_bytes())?;
    stream.flush()
}
