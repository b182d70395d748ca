//! zic-rpc: Zabbix JSON-RPC client for internal check items.
//!
//! Speaks the subset of the Zabbix API the exporter needs: `user.login`
//! to obtain a session token and `item.get` to list internal items.
//!
//! # Architecture
//!
//! ```text
//! ZabbixApi (trait)
//!   ├── login()       → AuthToken
//!   └── fetch_items() → Vec<Item>
//!
//! JsonRpcClient (hyper, HTTP/1)
//!   └── POST <base-url>/zabbix/api_jsonrpc.php
//! ```
//!
//! # Errors
//!
//! Every failure is an [`RpcError`] whose [`RpcError::kind`] is either
//! [`RpcErrorKind::Request`] (transport, timeout, non-2xx status, API
//! error object) or [`RpcErrorKind::Unexpected`] (malformed payload).
//! Callers branch on the kind, never on the message.

pub mod client;
pub mod error;
mod protocol;
pub mod types;

pub use client::{JsonRpcClient, ZabbixApi, DEFAULT_TIMEOUT};
pub use error::{RpcError, RpcErrorKind, RpcResult};
pub use types::{AuthToken, Item, ItemValue};
