use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::RpcConfig;
use crate::error::RpcError;
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{Block, BlockNumber};
use crate::retry::{RetryConfig, RetryManager};

pub const METHOD_BLOCK_NUMBER: &str = "eth_blockNumber";
pub const METHOD_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";

/// Status codes worth another attempt
static RETRYABLE_STATUSES: Lazy<HashSet<StatusCode>> = Lazy::new(|| {
    [
        StatusCode::REQUEST_TIMEOUT,
        StatusCode::TOO_MANY_REQUESTS,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::BAD_GATEWAY,
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::GATEWAY_TIMEOUT,
    ]
    .into_iter()
    .collect()
});

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Read access to the ledger, as needed by the polling engine
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_latest_block_number(&self) -> Result<BlockNumber, RpcError>;
    async fn fetch_block_by_number(&self, block_number: u64) -> Result<Block, RpcError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client over HTTP with bounded exponential backoff
pub struct RpcClient {
    client: Client,
    endpoint: String,
    retry: RetryManager,
    seq: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: String) -> Result<Self, RpcError> {
        Self::with_retry(endpoint, Duration::from_secs(30), RetryConfig::default())
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self, RpcError> {
        Self::with_retry(
            config.endpoint.clone(),
            config.timeout(),
            RetryConfig {
                max_attempts: config.max_attempts,
                base_delay: config.backoff_base(),
            },
        )
    }

    pub fn with_retry(endpoint: String, timeout: Duration, retry: RetryConfig) -> Result<Self, RpcError> {
        LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(endpoint))
            .with_metadata("max_attempts", serde_json::json!(retry.max_attempts))
            .info("Initializing RPC client");

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            retry: RetryManager::new("rpc_request", retry),
            seq: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Physical requests issued so far, retries included
    pub fn request_count(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<Option<T>, RpcError> {
        let monitor = PerformanceMonitor::new(&format!("rpc_{}", method));
        let result = self.retry.execute(|| self.attempt(method, &params)).await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(method, duration, result.is_ok());

        match result? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// One physical attempt; each gets a fresh id from the sequence
    async fn attempt(&self, method: &str, params: &[Value]) -> Result<Option<Value>, RpcError> {
        let id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        LogContext::new("rpc_client", "request")
            .with_metadata("method", serde_json::json!(method))
            .with_metadata("id", serde_json::json!(id))
            .trace("Sending RPC request");

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(if is_retryable_status(status) {
                RpcError::RetryableStatus { status: status.as_u16() }
            } else {
                RpcError::Status { status: status.as_u16() }
            });
        }

        let body = response.bytes().await?;
        let envelope: JsonRpcResponse = serde_json::from_slice(&body)?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Method {
                code: error.code,
                message: error.message,
            });
        }

        Ok(envelope.result.filter(|value| !value.is_null()))
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn fetch_latest_block_number(&self) -> Result<BlockNumber, RpcError> {
        let number: Option<BlockNumber> = self.request(METHOD_BLOCK_NUMBER, vec![]).await?;
        let number = number.ok_or(RpcError::MissingResult)?;

        LogContext::new("rpc_client", "fetch_latest_block_number")
            .with_metadata("result", serde_json::json!(number.as_str()))
            .debug("Retrieved latest block number");

        Ok(number)
    }

    async fn fetch_block_by_number(&self, block_number: u64) -> Result<Block, RpcError> {
        let params = vec![
            Value::String(BlockNumber::from_height(block_number).0),
            Value::Bool(true), // Include full transaction objects
        ];

        let block: Block = self
            .request(METHOD_GET_BLOCK_BY_NUMBER, params)
            .await?
            .ok_or(RpcError::BlockNotFound { block_number })?;

        LogContext::new("rpc_client", "fetch_block_by_number")
            .with_block_number(block_number)
            .with_metadata("transaction_count", serde_json::json!(block.transactions.len()))
            .debug(&format!("Retrieved block {} with {} transactions", block_number, block.transactions.len()));

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_client_creation() {
        let client = RpcClient::new("https://cloudflare-eth.com".to_string()).unwrap();
        assert_eq!(client.endpoint(), "https://cloudflare-eth.com");
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_json_rpc_request_serialization() {
        let params = vec![json!("0x3039"), json!(true)];
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: METHOD_GET_BLOCK_BY_NUMBER,
            params: &params,
            id: 7,
        };

        let serialized = serde_json::to_string(&request).unwrap();
        assert_eq!(
            serialized,
            r#"{"jsonrpc":"2.0","method":"eth_getBlockByNumber","params":["0x3039",true],"id":7}"#
        );
    }

    #[test]
    fn test_json_rpc_response_deserialization_error() {
        let body = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":1}"#;
        let response: JsonRpcResponse = serde_json::from_str(body).unwrap();

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [408u16, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()), "{} should retry", code);
        }
        for code in [400u16, 401, 403, 404, 501] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()), "{} should not retry", code);
        }
    }
}
