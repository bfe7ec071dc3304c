//! MCP Transport Implementations
//!
//! Client-side transports carry one JSON-RPC request to a tool server and
//! bring back its response.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use super::server::ToolServer;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport failures
#[derive(Debug, thiserror::Error)]
pub enum McpTransportError {
    /// The server could not be reached
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request was sent but failed
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with something that is not a JSON-RPC response
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl McpTransportError {
    pub fn is_connect(&self) -> bool {
        matches!(self, McpTransportError::Connect(_))
    }
}

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its response
    async fn round_trip(&self, request: JsonRpcRequest)
    -> Result<JsonRpcResponse, McpTransportError>;
}

/// JSON-RPC over HTTP POST
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, McpTransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| McpTransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn classify(err: reqwest::Error) -> McpTransportError {
    if err.is_connect() {
        McpTransportError::Connect(err.to_string())
    } else {
        McpTransportError::Request(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(
        &self,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, McpTransportError> {
        tracing::debug!(url = %self.url, method = %request.method, "Sending MCP request");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(|e| McpTransportError::Request(e.to_string()))?;

        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| McpTransportError::InvalidResponse(e.to_string()))
    }
}

type Handler = Arc<dyn Fn(JsonRpcRequest) -> BoxFuture<'static, JsonRpcResponse> + Send + Sync>;

/// In-process transport backed by a handler function
pub struct MemoryTransport {
    handler: Option<Handler>,
    unreachable: String,
    sent: Mutex<Vec<String>>,
}

impl MemoryTransport {
    /// Answer every request with `handler`
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(JsonRpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JsonRpcResponse> + Send + 'static,
    {
        Self {
            handler: Some(Arc::new(move |request| Box::pin(handler(request)))),
            unreachable: String::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Serve requests from an in-process [`ToolServer`]
    pub fn loopback(server: Arc<ToolServer>) -> Self {
        Self::new(move |request| {
            let server = Arc::clone(&server);
            async move { server.handle_request(request).await }
        })
    }

    /// Fail every request with a connect error
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            handler: None,
            unreachable: reason.into(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Methods of all requests sent so far, in order
    pub fn sent_methods(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn round_trip(
        &self,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, McpTransportError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(request.method.clone());
        }
        match &self.handler {
            Some(handler) => Ok(handler(request).await),
            None => Err(McpTransportError::Connect(self.unreachable.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcError, RequestId};

    #[tokio::test]
    async fn test_memory_transport_handler() {
        let transport = MemoryTransport::new(|request: JsonRpcRequest| async move {
            JsonRpcResponse::success(request.id, serde_json::json!({"echo": request.method}))
        });

        let response = transport
            .round_trip(JsonRpcRequest::new(7i64, "tools/list"))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::Number(7));
        assert_eq!(response.result.unwrap()["echo"], "tools/list");
        assert_eq!(transport.sent_methods(), vec!["tools/list".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_transport_error_response() {
        let transport = MemoryTransport::new(|request: JsonRpcRequest| async move {
            JsonRpcResponse::error(request.id, JsonRpcError::method_not_found())
        });
        let response = transport
            .round_trip(JsonRpcRequest::new(1i64, "nope"))
            .await
            .unwrap();
        assert!(response.error.unwrap().is_method_not_found());
    }

    #[tokio::test]
    async fn test_unreachable_transport() {
        let transport = MemoryTransport::unreachable("connection refused");
        let err = transport
            .round_trip(JsonRpcRequest::new(1i64, "initialize"))
            .await
            .unwrap_err();
        assert!(err.is_connect());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_http_transport_builds() {
        let transport = HttpTransport::new("http://127.0.0.1:9/mcp", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.url(), "http://127.0.0.1:9/mcp");
    }
}
