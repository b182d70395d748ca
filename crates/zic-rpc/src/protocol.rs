//! JSON-RPC 2.0 envelopes for the Zabbix API.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RpcError, RpcResult};

pub(crate) const JSONRPC_VERSION: &str = "2.0";
pub(crate) const USER_LOGIN: &str = "user.login";
pub(crate) const ITEM_GET: &str = "item.get";

/// Item type 5 is "Zabbix internal".
const INTERNAL_ITEM_TYPE: u8 = 5;
const EXTEND_OUTPUT: &str = "extend";

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a, P> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginParams<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemGetParams<'a> {
    output: &'static str,
    #[serde(rename = "type")]
    item_type: u8,
    search: ItemSearch<'a>,
    search_wildcards_enabled: bool,
}

#[derive(Debug, Serialize)]
struct ItemSearch<'a> {
    #[serde(rename = "key_")]
    key: &'a str,
}

impl<'a> ItemGetParams<'a> {
    /// Internal items whose key matches `pattern` (`*` wildcards allowed).
    pub fn internal(pattern: &'a str) -> Self {
        Self {
            output: EXTEND_OUTPUT,
            item_type: INTERNAL_ITEM_TYPE,
            search: ItemSearch { key: pattern },
            search_wildcards_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: String,
}

/// Decode a response body into its `result`, mapping an `error` object to
/// [`RpcError::Api`].
pub(crate) fn decode_response<T: DeserializeOwned>(body: &[u8]) -> RpcResult<T> {
    let response: Response<T> =
        serde_json::from_slice(body).map_err(|e| RpcError::Decode(e.to_string()))?;

    match response {
        Response {
            error: Some(err), ..
        } => Err(RpcError::Api {
            code: err.code,
            message: err.message,
            data: err.data,
        }),
        Response {
            result: Some(result),
            ..
        } => Ok(result),
        _ => Err(RpcError::Decode(
            "response carries neither result nor error".to_string(),
        )),
    }
}
