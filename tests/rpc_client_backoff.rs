use serde_json::{json, Value};
use std::time::{Duration, Instant};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use eth_tx_tracker::blockchain::{LedgerClient, RpcClient};
use eth_tx_tracker::error::RpcError;
use eth_tx_tracker::retry::RetryConfig;

fn fast_client(endpoint: String, max_attempts: u32) -> RpcClient {
    RpcClient::with_retry(
        endpoint,
        Duration::from_secs(5),
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
        },
    )
    .expect("Failed to build RPC client")
}

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("request body is JSON"))
        .collect()
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!("0x10")))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 5);
    let head = client.fetch_latest_block_number().await.expect("fourth attempt succeeds");

    assert_eq!(head.to_u64().unwrap(), 16);
    assert_eq!(client.request_count(), 4);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 4);
    let ids: Vec<u64> = bodies.iter().map(|body| body["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    for body in &bodies {
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "eth_blockNumber");
        assert_eq!(body["params"], json!([]));
    }
}

#[tokio::test]
async fn test_exhaustion_reports_last_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 3);
    let started = Instant::now();
    let error = client.fetch_latest_block_number().await.unwrap_err();

    match &error {
        RpcError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**last, RpcError::RetryableStatus { status: 503 }));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert!(error.to_string().contains("503"));
    assert_eq!(request_bodies(&server).await.len(), 3);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_terminal_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 5);
    let error = client.fetch_latest_block_number().await.unwrap_err();

    assert!(matches!(error, RpcError::Status { status: 404 }));
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 5);
    let error = client.fetch_latest_block_number().await.unwrap_err();

    assert!(matches!(error, RpcError::Decode(_)));
    assert!(error.is_decode());
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_method_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32005, "message": "limit exceeded"}
        })))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 5);
    let error = client.fetch_latest_block_number().await.unwrap_err();

    match error {
        RpcError::Method { code, message } => {
            assert_eq!(code, -32005);
            assert_eq!(message, "limit exceeded");
        }
        other => panic!("expected method error, got {:?}", other),
    }
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_fetch_block_with_full_transactions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getBlockByNumber",
            "params": ["0x3039", true]
        })))
        .respond_with(rpc_result(json!({
            "number": "0x3039",
            "hash": "0xblock",
            "parentHash": "0xparent",
            "timestamp": "0x5f5e100",
            "baseFeePerGas": "0x7",
            "transactions": [
                {
                    "hash": "0xt1",
                    "blockNumber": "0x3039",
                    "from": "0xabc123",
                    "to": "0xdef456",
                    "value": "0x56bc75e2d63100000",
                    "type": "0x2",
                    "chainId": "0x1"
                },
                {
                    "hash": "0xt2",
                    "blockNumber": "0x3039",
                    "from": "0xabc123",
                    "to": null,
                    "value": "0x0",
                    "input": "0x6080"
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 5);
    let block = client.fetch_block_by_number(12345).await.expect("block is served");

    assert_eq!(block.number, "0x3039");
    assert_eq!(block.parent_hash, "0xparent");
    assert_eq!(block.base_fee_per_gas.as_deref(), Some("0x7"));
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(block.transactions[0].to.as_deref(), Some("0xdef456"));
    assert_eq!(block.transactions[0].eth_amount().unwrap(), "100.00000000");
    assert!(block.transactions[0].subscriber.is_empty());
    assert_eq!(block.transactions[1].to, None);
}

#[tokio::test]
async fn test_missing_block_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(Value::Null))
        .mount(&server)
        .await;

    let client = fast_client(server.uri(), 5);
    let error = client.fetch_block_by_number(99).await.unwrap_err();

    assert!(matches!(error, RpcError::BlockNotFound { block_number: 99 }));
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_attempts() {
    // Port 1 is reserved and nothing listens there
    let client = fast_client("http://127.0.0.1:1".to_string(), 2);
    let error = client.fetch_latest_block_number().await.unwrap_err();

    match error {
        RpcError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, RpcError::Transport(_)));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    assert_eq!(client.request_count(), 2);
}
