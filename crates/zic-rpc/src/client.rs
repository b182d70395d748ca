//! JSON-RPC transport over hyper.
//!
//! Each call is a single POST to `<base-url>/zabbix/api_jsonrpc.php`,
//! bounded by a per-call timeout that covers connect, response headers,
//! and body.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{RpcError, RpcResult};
use crate::protocol::{
    ITEM_GET, ItemGetParams, JSONRPC_VERSION, LoginParams, Request, USER_LOGIN, decode_response,
};
use crate::types::{AuthToken, Item};

/// Default bound on a single API call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const API_PATH: &str = "/zabbix/api_jsonrpc.php";
const JSON_RPC_CONTENT_TYPE: &str = "application/json-rpc";

/// The operations the collector needs from a Zabbix server.
pub trait ZabbixApi: Send + Sync {
    /// Authenticate and return a session token.
    fn login(
        &self,
        user: &str,
        password: &str,
    ) -> impl Future<Output = RpcResult<AuthToken>> + Send;

    /// List internal items whose key matches `key_pattern`.
    fn fetch_items(
        &self,
        token: &AuthToken,
        key_pattern: &str,
    ) -> impl Future<Output = RpcResult<Vec<Item>>> + Send;
}

impl<T: ZabbixApi> ZabbixApi for Arc<T> {
    fn login(
        &self,
        user: &str,
        password: &str,
    ) -> impl Future<Output = RpcResult<AuthToken>> + Send {
        (**self).login(user, password)
    }

    fn fetch_items(
        &self,
        token: &AuthToken,
        key_pattern: &str,
    ) -> impl Future<Output = RpcResult<Vec<Item>>> + Send {
        (**self).fetch_items(token, key_pattern)
    }
}

/// Zabbix API client speaking JSON-RPC 2.0 over plain HTTP/1.
pub struct JsonRpcClient {
    endpoint: Uri,
    http: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client for the Zabbix frontend at `base_url` (e.g.
    /// `http://zabbix.example.com`).
    pub fn new(base_url: &str) -> RpcResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-call timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> RpcResult<Self> {
        let raw = format!("{}{API_PATH}", base_url.trim_end_matches('/'));
        let endpoint: Uri = raw.parse().map_err(|e: http::uri::InvalidUri| RpcError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        if endpoint.scheme_str() != Some("http") || endpoint.host().is_none() {
            return Err(RpcError::InvalidUrl {
                url: base_url.to_string(),
                reason: "expected an http:// url with a host".to_string(),
            });
        }

        let http = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            endpoint,
            http,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// The full API endpoint this client posts to.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    async fn call<P, T>(&self, method: &'static str, params: P, auth: Option<&str>) -> RpcResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&Request {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id,
            auth,
        })
        .map_err(|e| RpcError::Encode(e.to_string()))?;

        let req = http::Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, JSON_RPC_CONTENT_TYPE)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| RpcError::Encode(e.to_string()))?;

        let bytes = match tokio::time::timeout(self.timeout, self.send(req)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(%method, url = %self.endpoint, "zabbix api call timed out");
                return Err(RpcError::Timeout {
                    url: self.endpoint.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        debug!(%method, id, bytes = bytes.len(), "zabbix api call completed");
        decode_response(&bytes)
    }

    async fn send(&self, req: http::Request<Full<Bytes>>) -> RpcResult<Bytes> {
        let resp = self.http.request(req).await.map_err(|e| RpcError::Transport {
            url: self.endpoint.to_string(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, url = %self.endpoint, "zabbix api non-2xx");
            return Err(RpcError::Status(status.as_u16()));
        }

        let collected = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| RpcError::Body(e.to_string()))?;
        Ok(collected.to_bytes())
    }
}

impl ZabbixApi for JsonRpcClient {
    async fn login(&self, user: &str, password: &str) -> RpcResult<AuthToken> {
        self.call(USER_LOGIN, LoginParams { user, password }, None)
            .await
    }

    async fn fetch_items(&self, token: &AuthToken, key_pattern: &str) -> RpcResult<Vec<Item>> {
        self.call(
            ITEM_GET,
            ItemGetParams::internal(key_pattern),
            Some(token.as_str()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Bytes as AxumBytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{Value, json};

    use super::*;
    use crate::error::RpcErrorKind;
    use crate::types::ItemValue;

    /// What the fake Zabbix frontend saw: (content-type, request body).
    type Seen = Arc<Mutex<Vec<(String, Value)>>>;

    #[derive(Clone)]
    struct FakeZabbix {
        status: StatusCode,
        body: &'static str,
        delay: Duration,
        seen: Seen,
    }

    async fn handle(
        State(fake): State<FakeZabbix>,
        headers: HeaderMap,
        body: AxumBytes,
    ) -> (StatusCode, String) {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        fake.seen.lock().unwrap().push((content_type, json));
        if !fake.delay.is_zero() {
            tokio::time::sleep(fake.delay).await;
        }
        (fake.status, fake.body.to_string())
    }

    async fn spawn_fake(status: StatusCode, body: &'static str, delay: Duration) -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route(API_PATH, post(handle))
            .with_state(FakeZabbix {
                status,
                body,
                delay,
                seen: seen.clone(),
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), seen)
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = JsonRpcClient::new("http://zabbix.example.com/").unwrap();
        assert_eq!(
            client.endpoint().to_string(),
            "http://zabbix.example.com/zabbix/api_jsonrpc.php"
        );
    }

    #[test]
    fn rejects_unusable_urls() {
        for url in ["", "zabbix.example.com", "https://zabbix.example.com", "ftp://x"] {
            let err = JsonRpcClient::new(url).err().unwrap();
            assert_eq!(err.kind(), RpcErrorKind::Unexpected, "{url}");
        }
    }

    #[tokio::test]
    async fn login_returns_token() {
        let (url, seen) = spawn_fake(
            StatusCode::OK,
            r#"{"jsonrpc":"2.0","result":"0424bd59b807674191e7d77572075f33","id":1}"#,
            Duration::ZERO,
        )
        .await;
        let client = JsonRpcClient::new(&url).unwrap();

        let token = client.login("Admin", "zabbix").await.unwrap();
        assert_eq!(token.as_str(), "0424bd59b807674191e7d77572075f33");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (content_type, body) = &seen[0];
        assert_eq!(content_type, "application/json-rpc");
        assert_eq!(body["method"], "user.login");
        assert_eq!(body["params"], json!({"user": "Admin", "password": "zabbix"}));
        assert!(body.get("auth").is_none());
    }

    #[tokio::test]
    async fn fetch_items_searches_internal_items() {
        let (url, seen) = spawn_fake(
            StatusCode::OK,
            r#"{"jsonrpc":"2.0","result":[
                {"name":"WCache","key_":"zabbix[wcache]","status":"0","lastvalue":"3.5","prevvalue":"3"},
                {"name":"Queue","key_":"zabbix[queue]","status":"1","lastvalue":7}
            ],"id":2}"#,
            Duration::ZERO,
        )
        .await;
        let client = JsonRpcClient::new(&url).unwrap();

        let items = client
            .fetch_items(&AuthToken::new("tok"), "zabbix[*]")
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "WCache");
        assert_eq!(
            items[0].last_value,
            Some(ItemValue::Text("3.5".to_string()))
        );
        assert_eq!(items[1].status, "1");
        assert_eq!(items[1].last_value, Some(ItemValue::Other(json!(7))));

        let seen = seen.lock().unwrap();
        let (_, body) = &seen[0];
        assert_eq!(body["method"], "item.get");
        assert_eq!(body["auth"], "tok");
        assert_eq!(body["params"]["type"], 5);
        assert_eq!(body["params"]["output"], "extend");
        assert_eq!(body["params"]["search"]["key_"], "zabbix[*]");
        assert_eq!(body["params"]["searchWildcardsEnabled"], true);
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let (url, seen) = spawn_fake(
            StatusCode::OK,
            r#"{"jsonrpc":"2.0","result":"t","id":1}"#,
            Duration::ZERO,
        )
        .await;
        let client = JsonRpcClient::new(&url).unwrap();
        client.login("a", "b").await.unwrap();
        client.login("a", "b").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1["id"], 1);
        assert_eq!(seen[1].1["id"], 2);
    }

    #[tokio::test]
    async fn non_2xx_is_request_error() {
        let (url, _) = spawn_fake(StatusCode::BAD_GATEWAY, "bad gateway", Duration::ZERO).await;
        let client = JsonRpcClient::new(&url).unwrap();

        let err = client.login("Admin", "zabbix").await.unwrap_err();
        assert!(matches!(err, RpcError::Status(502)));
        assert_eq!(err.kind(), RpcErrorKind::Request);
    }

    #[tokio::test]
    async fn expired_session_is_request_error() {
        let (url, _) = spawn_fake(
            StatusCode::OK,
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params.","data":"Session terminated, re-login, please."},"id":1}"#,
            Duration::ZERO,
        )
        .await;
        let client = JsonRpcClient::new(&url).unwrap();

        let err = client
            .fetch_items(&AuthToken::new("stale"), "zabbix[*]")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::Request);
    }

    #[tokio::test]
    async fn malformed_body_is_unexpected() {
        let (url, _) = spawn_fake(StatusCode::OK, "not json at all", Duration::ZERO).await;
        let client = JsonRpcClient::new(&url).unwrap();

        let err = client
            .fetch_items(&AuthToken::new("tok"), "zabbix[*]")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RpcErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn connection_refused_is_request_error() {
        // Bind and immediately drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = JsonRpcClient::new(&format!("http://{addr}")).unwrap();
        let err = client.login("Admin", "zabbix").await.unwrap_err();
        assert!(matches!(err, RpcError::Transport { .. }), "{err}");
        assert_eq!(err.kind(), RpcErrorKind::Request);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let (url, _) = spawn_fake(
            StatusCode::OK,
            r#"{"jsonrpc":"2.0","result":"t","id":1}"#,
            Duration::from_secs(2),
        )
        .await;
        let client = JsonRpcClient::with_timeout(&url, Duration::from_millis(100)).unwrap();

        let err = client.login("Admin", "zabbix").await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout { .. }), "{err}");
        assert_eq!(err.kind(), RpcErrorKind::Request);
    }
}
