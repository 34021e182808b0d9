//! The newline-delimited JSON wire protocol spoken between
//! [`crate::client::KvClient`] and [`crate::server::KvServer`].
//!
//! A request is one JSON object per line: `{"op": "...", ...}`. A response is
//! one JSON object per line: `{"status":"ok", ...}` or
//! `{"status":"error","error":"<tag>"}`. Field coercion mirrors the
//! reference client: a `key`/`value` may arrive as a JSON string, number, or
//! bool, and is stringified; any other JSON type (including `null`) is
//! treated as though the field were absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// A parsed client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
    BulkSet { items: Vec<(String, String)> },
    SearchText { query: String },
    SearchEmbedding { query: String, top_k: usize },
}

/// Default `top_k` for `search_embedding` when the field is omitted.
const DEFAULT_TOP_K: usize = 10;

/// Stringify a scalar JSON value the way the reference client's field
/// coercion does. Returns `None` for anything other than a string, number,
/// or bool — including `null`, arrays, and objects.
fn coerce_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field(obj: &Value, name: &str) -> Option<String> {
    obj.get(name).and_then(coerce_scalar)
}

impl Request {
    /// Parse one line of client input. `line` must already have its
    /// trailing newline stripped.
    pub fn parse(line: &str) -> Result<Request> {
        let value: Value = serde_json::from_str(line).map_err(|_| StoreError::InvalidJson)?;
        let obj = value.as_object().ok_or(StoreError::InvalidJson)?;

        let op = match obj.get("op").and_then(Value::as_str) {
            Some(op) => op,
            None => return Err(StoreError::UnknownOp),
        };

        match op {
            "get" => {
                let key = field(&value, "key").ok_or(StoreError::MissingKey)?;
                Ok(Request::Get { key })
            }
            "delete" => {
                let key = field(&value, "key").ok_or(StoreError::MissingKey)?;
                Ok(Request::Delete { key })
            }
            "set" => {
                let key = field(&value, "key").ok_or(StoreError::MissingKeyOrValue)?;
                let val = field(&value, "value").ok_or(StoreError::MissingKeyOrValue)?;
                Ok(Request::Set { key, value: val })
            }
            "bulk_set" => {
                let items = parse_bulk_items(&value)?;
                Ok(Request::BulkSet { items })
            }
            "search_text" => {
                let query = field(&value, "query").ok_or(StoreError::MissingQuery)?;
                Ok(Request::SearchText { query })
            }
            "search_embedding" => {
                let query = field(&value, "query").ok_or(StoreError::MissingQuery)?;
                let top_k = obj
                    .get("top_k")
                    .map(|v| v.as_u64().ok_or(StoreError::InvalidTopK))
                    .transpose()?
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_TOP_K);
                Ok(Request::SearchEmbedding { query, top_k })
            }
            _ => Err(StoreError::UnknownOp),
        }
    }
}

fn parse_bulk_items(value: &Value) -> Result<Vec<(String, String)>> {
    let raw = value
        .get("items")
        .and_then(Value::as_array)
        .ok_or(StoreError::InvalidItems)?;

    let mut items = Vec::with_capacity(raw.len());
    for entry in raw {
        let pair = entry.as_array().ok_or(StoreError::InvalidItems)?;
        if pair.len() != 2 {
            return Err(StoreError::InvalidItems);
        }
        let key = coerce_scalar(&pair[0]).ok_or(StoreError::InvalidItems)?;
        let val = coerce_scalar(&pair[1]).ok_or(StoreError::InvalidItems)?;
        items.push((key, val));
    }
    Ok(items)
}

/// A response sent back to the client, one JSON object per line. Internally
/// tagged on `status`, matching the wire schema exactly:
///
/// * `set` / `bulk_set` success — `{"status":"ok"}`
/// * `get` hit — `{"status":"ok","value":"..."}`
/// * `get` miss — `{"status":"not_found"}`
/// * `delete` — `{"status":"ok","deleted":true|false}`
/// * failure — `{"status":"error","error":"<tag>"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        deleted: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        matches: Option<Vec<(String, f64)>>,
    },
    NotFound,
    Error {
        error: String,
    },
}

impl Response {
    pub fn ok() -> Response {
        Response::Ok {
            value: None,
            deleted: None,
            keys: None,
            matches: None,
        }
    }

    /// `get`'s response: hit yields `Ok{value}`, miss yields `NotFound`.
    pub fn get_result(value: Option<String>) -> Response {
        match value {
            Some(v) => Response::Ok {
                value: Some(v),
                deleted: None,
                keys: None,
                matches: None,
            },
            None => Response::NotFound,
        }
    }

    pub fn deleted(existed: bool) -> Response {
        Response::Ok {
            value: None,
            deleted: Some(existed),
            keys: None,
            matches: None,
        }
    }

    /// `search_text`'s response: the matching keys, in index order.
    pub fn search_text_result(keys: Vec<String>) -> Response {
        Response::Ok {
            value: None,
            deleted: None,
            keys: Some(keys),
            matches: None,
        }
    }

    /// `search_embedding`'s response: `(key, score)` pairs, highest score first.
    pub fn search_embedding_result(matches: Vec<(String, f64)>) -> Response {
        Response::Ok {
            value: None,
            deleted: None,
            keys: None,
            matches: Some(matches),
        }
    }

    pub fn error(tag: impl Into<String>) -> Response {
        Response::Error { error: tag.into() }
    }

    pub fn from_error(err: &StoreError) -> Response {
        Response::error(err.wire_tag())
    }

    /// Serialize to one line, newline included.
    pub fn to_line(&self) -> String {
        let mut s = serde_json::to_string(self).expect("Response always serializes");
        s.push('\n');
        s
    }
}
