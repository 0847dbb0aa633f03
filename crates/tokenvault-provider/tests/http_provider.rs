use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokenvault_provider::{
    Eip1193Provider, EndpointHealth, HttpProvider, ProviderError, TypedProvider,
};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rpc_ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

#[tokio::test]
async fn test_chain_id_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_chainId" })))
        .respond_with(rpc_ok(json!("0xaa36a7")))
        .mount(&server)
        .await;

    let http = HttpProvider::new([server.uri()], Duration::from_secs(5)).unwrap();
    let provider = TypedProvider::new(Arc::new(http));
    assert_eq!(provider.chain_id().await.unwrap(), 11_155_111);
}

#[tokio::test]
async fn test_rpc_error_is_surfaced_without_failover() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": 3, "message": "execution reverted" }
        })))
        .mount(&server)
        .await;

    let http = HttpProvider::new([server.uri()], Duration::from_secs(5)).unwrap();
    let err = http.request("eth_call", json!([{}, "latest"])).await.unwrap_err();
    assert!(err.is_execution_reverted());
    assert_eq!(http.stats()[0].total_failures, 0);
}

#[tokio::test]
async fn test_fails_over_to_next_endpoint() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_ok(json!("0x10")))
        .mount(&healthy)
        .await;

    let http = HttpProvider::new([broken.uri(), healthy.uri()], Duration::from_secs(5)).unwrap();
    let result = http.request("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(result, json!("0x10"));

    let stats = http.stats();
    assert_eq!(stats[0].health, EndpointHealth::Unhealthy);
    assert_eq!(stats[1].health, EndpointHealth::Healthy);
    assert_eq!(http.current_url().unwrap().as_str().trim_end_matches('/'), healthy.uri());
}

#[tokio::test]
async fn test_all_endpoints_failed() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&broken)
        .await;

    let http = HttpProvider::new([broken.uri()], Duration::from_secs(5)).unwrap();
    let err = http.request("eth_blockNumber", json!([])).await.unwrap_err();
    assert!(matches!(err, ProviderError::AllEndpointsFailed));
}

#[tokio::test]
async fn test_null_receipt_is_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getTransactionReceipt" })))
        .respond_with(rpc_ok(json!(null)))
        .mount(&server)
        .await;

    let http = HttpProvider::new([server.uri()], Duration::from_secs(5)).unwrap();
    let provider = TypedProvider::new(Arc::new(http));
    let receipt = provider.transaction_receipt(Default::default()).await.unwrap();
    assert!(receipt.is_none());
}
