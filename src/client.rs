//! `KvClient`: a small synchronous TCP client speaking the same
//! newline-delimited JSON protocol as [`crate::server::KvServer`].

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, StoreError};
use crate::protocol::{Request, Response};

/// Connect-and-read timeout applied to every client operation when none is
/// given explicitly.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connection to one `durakv` server.
pub struct KvClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl KvClient {
    /// Connect to `addr` with the default timeout.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::connect_timeout(resolve(addr)?, DEFAULT_TIMEOUT)
    }

    /// Connect to `addr`, applying `timeout` to both the connect and every
    /// subsequent read.
    pub fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(KvClient { stream, reader })
    }

    /// `get`: returns `None` if the key is absent.
    pub fn get(&mut self, key: impl Into<String>) -> Result<Option<String>> {
        match self.roundtrip(&format!(
            r#"{{"op":"get","key":{}}}"#,
            serde_json::to_string(&key.into())?
        ))? {
            Response::Ok { value, .. } => Ok(value),
            Response::NotFound => Ok(None),
            Response::Error { error, .. } => Err(StoreError::StringError(error)),
        }
    }

    /// `set`: overwrite (or create) `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        match self.roundtrip(&format!(
            r#"{{"op":"set","key":{},"value":{}}}"#,
            serde_json::to_string(&key.into())?,
            serde_json::to_string(&value.into())?,
        ))? {
            Response::Ok { .. } => Ok(()),
            Response::NotFound => Ok(()),
            Response::Error { error, .. } => Err(StoreError::StringError(error)),
        }
    }

    /// `delete`: returns whether the key existed.
    pub fn delete(&mut self, key: impl Into<String>) -> Result<bool> {
        match self.roundtrip(&format!(
            r#"{{"op":"delete","key":{}}}"#,
            serde_json::to_string(&key.into())?
        ))? {
            Response::Ok { deleted, .. } => Ok(deleted.unwrap_or(false)),
            Response::NotFound => Ok(false),
            Response::Error { error, .. } => Err(StoreError::StringError(error)),
        }
    }

    /// `bulk_set`: apply an ordered group of sets atomically.
    pub fn bulk_set(&mut self, items: Vec<(String, String)>) -> Result<()> {
        let request = Request::BulkSet { items };
        let line = request_to_json(&request)?;
        match self.roundtrip(&line)? {
            Response::Ok { .. } => Ok(()),
            Response::NotFound => Ok(()),
            Response::Error { error, .. } => Err(StoreError::StringError(error)),
        }
    }

    /// `search_text`: union full-text search over current values, keys
    /// returned in index order.
    pub fn search_full_text(&mut self, query: impl Into<String>) -> Result<Vec<String>> {
        match self.roundtrip(&format!(
            r#"{{"op":"search_text","query":{}}}"#,
            serde_json::to_string(&query.into())?
        ))? {
            Response::Ok { keys, .. } => Ok(keys.unwrap_or_default()),
            Response::NotFound => Ok(Vec::new()),
            Response::Error { error, .. } => Err(StoreError::StringError(error)),
        }
    }

    /// `search_embedding`: cosine-similarity search, `top_k` highest-scoring
    /// keys first.
    pub fn search_embedding(
        &mut self,
        query: impl Into<String>,
        top_k: usize,
    ) -> Result<Vec<(String, f64)>> {
        match self.roundtrip(&format!(
            r#"{{"op":"search_embedding","query":{},"top_k":{}}}"#,
            serde_json::to_string(&query.into())?,
            top_k,
        ))? {
            Response::Ok { matches, .. } => Ok(matches.unwrap_or_default()),
            Response::NotFound => Ok(Vec::new()),
            Response::Error { error, .. } => Err(StoreError::StringError(error)),
        }
    }

    fn roundtrip(&mut self, request_line: &str) -> Result<Response> {
        self.stream.write_all(request_line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;

        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Err(StoreError::StringError(
                "server closed the connection".to_string(),
            ));
        }
        serde_json::from_str(line.trim_end()).map_err(StoreError::from)
    }
}

fn resolve<A: ToSocketAddrs>(addr: A) -> Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| StoreError::StringError("could not resolve address".to_string()))
}

fn request_to_json(request: &Request) -> Result<String> {
    let value = match request {
        Request::Get { key } => serde_json::json!({"op": "get", "key": key}),
        Request::Set { key, value } => serde_json::json!({"op": "set", "key": key, "value": value}),
        Request::Delete { key } => serde_json::json!({"op": "delete", "key": key}),
        Request::BulkSet { items } => serde_json::json!({"op": "bulk_set", "items": items}),
        Request::SearchText { query } => serde_json::json!({"op": "search_text", "query": query}),
        Request::SearchEmbedding { query, top_k } => {
            serde_json::json!({"op": "search_embedding", "query": query, "top_k": top_k})
        }
    };
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::KvServer;
    use crate::store::Store;
    use crate::thread_pool::NaiveThreadPool;
    use tempfile::tempdir;

    fn start_server() -> (crate::server::ShutdownHandle, std::thread::JoinHandle<()>) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("data.log")).unwrap();
        let pool = NaiveThreadPool::new(2).unwrap();
        let server = KvServer::new(store, pool);
        let (handle, run) = server.run_with_shutdown("127.0.0.1:0").unwrap();
        let join = std::thread::spawn(move || run().unwrap());
        std::mem::forget(dir);
        (handle, join)
    }

    #[test]
    fn client_set_get_delete_round_trip() {
        let (handle, join) = start_server();
        std::thread::sleep(Duration::from_millis(50));

        let mut client = KvClient::connect(handle.addr()).unwrap();
        client.set("k", "v").unwrap();
        assert_eq!(client.get("k").unwrap(), Some("v".to_string()));
        assert!(client.delete("k").unwrap());
        assert_eq!(client.get("k").unwrap(), None);

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn client_bulk_set() {
        let (handle, join) = start_server();
        std::thread::sleep(Duration::from_millis(50));

        let mut client = KvClient::connect(handle.addr()).unwrap();
        client
            .bulk_set(vec![("a".into(), "1".into()), ("b".into(), "2".into())])
            .unwrap();
        assert_eq!(client.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(client.get("b").unwrap(), Some("2".to_string()));

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn client_search_full_text() {
        let (handle, join) = start_server();
        std::thread::sleep(Duration::from_millis(50));

        let mut client = KvClient::connect(handle.addr()).unwrap();
        client.set("k1", "the quick brown fox").unwrap();
        assert_eq!(
            client.search_full_text("quick").unwrap(),
            vec!["k1".to_string()]
        );

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn client_search_embedding() {
        let (handle, join) = start_server();
        std::thread::sleep(Duration::from_millis(50));

        let mut client = KvClient::connect(handle.addr()).unwrap();
        client.set("k1", "rust key value store").unwrap();
        let results = client.search_embedding("rust key value store", 5).unwrap();
        assert!(results.iter().any(|(k, _)| k == "k1"));

        handle.shutdown();
        join.join().unwrap();
    }

    #[test]
    fn client_surfaces_server_error() {
        let (handle, join) = start_server();
        std::thread::sleep(Duration::from_millis(50));

        let mut client = KvClient::connect(handle.addr()).unwrap();
        let err = client.delete("gone").unwrap();
        assert!(!err);

        handle.shutdown();
        join.join().unwrap();
    }
}
