//! JSON-RPC settlement client
//!
//! Talks to an Ethereum-style node whose account for `from` is managed by the
//! wallet (the node or a signing proxy prompts the user). Bids are sent with
//! `eth_sendTransaction` and tracked with `eth_getTransactionReceipt`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::abi::to_hex;
use crate::encoder::EncodedAmount;
use crate::settlement::{
    Receipt, ReceiptSource, SettlementError, SettlementService, SettlementTarget, TransactionRef,
};
use crate::wallet::WalletAddress;

/// EIP-1193 "user rejected request"
const USER_REJECTED: i64 = 4001;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

/// Settlement and receipt collaborator over HTTP JSON-RPC
pub struct JsonRpcSettlement {
    client: reqwest::Client,
    url: String,
    from: WalletAddress,
    target: SettlementTarget,
    next_id: AtomicU64,
}

impl JsonRpcSettlement {
    pub fn new(
        url: impl Into<String>,
        from: WalletAddress,
        target: SettlementTarget,
        request_timeout: Duration,
    ) -> Result<Self, SettlementError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SettlementError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            from,
            target,
            next_id: AtomicU64::new(1),
        })
    }

    /// Transaction object for a bid call; no funds accompany it
    fn transaction(&self, data: &[u8]) -> Value {
        json!({
            "from": self.from.as_str(),
            "to": self.target.contract.as_str(),
            "data": to_hex(data),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SettlementError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SettlementError::Transport(format!("HTTP {}", status)));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::Decode(e.to_string()))?;

        match (parsed.error, parsed.result) {
            (Some(err), _) if err.code == USER_REJECTED => Err(SettlementError::Rejected(err.message)),
            (Some(err), _) => Err(SettlementError::Rpc {
                code: err.code,
                message: err.message,
            }),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

fn parse_quantity(field: &str, value: &str) -> Result<u64, SettlementError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| SettlementError::Decode(format!("{} is not a hex quantity: {}", field, value)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| SettlementError::Decode(format!("{} '{}': {}", field, value, e)))
}

#[async_trait]
impl SettlementService for JsonRpcSettlement {
    async fn place_encrypted_bid(
        &self,
        bond_id: u64,
        encoded_amount: EncodedAmount,
    ) -> Result<TransactionRef, SettlementError> {
        let data = self
            .target
            .call
            .encode_call(&[bond_id as u128, encoded_amount.as_u128()])?;

        let tx = self.transaction(&data);
        match self.call("eth_sendTransaction", json!([tx])).await? {
            Value::String(hash) if hash.starts_with("0x") => Ok(TransactionRef::new(hash)),
            other => Err(SettlementError::Decode(format!(
                "unexpected transaction hash: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl ReceiptSource for JsonRpcSettlement {
    async fn receipt(&self, tx_ref: &TransactionRef) -> Result<Option<Receipt>, SettlementError> {
        let result = self
            .call("eth_getTransactionReceipt", json!([tx_ref.as_str()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let raw: RawReceipt =
            serde_json::from_value(result).map_err(|e| SettlementError::Decode(e.to_string()))?;

        // A receipt without a block number is still pending on some nodes
        let Some(block_number) = raw.block_number else {
            return Ok(None);
        };

        let status = raw
            .status
            .ok_or_else(|| SettlementError::Decode("receipt has no status".to_string()))?;

        Ok(Some(Receipt {
            success: parse_quantity("status", &status)? == 1,
            block_number: parse_quantity("blockNumber", &block_number)?,
        }))
    }

    async fn block_number(&self) -> Result<u64, SettlementError> {
        match self.call("eth_blockNumber", json!([])).await? {
            Value::String(n) => parse_quantity("blockNumber", &n),
            other => Err(SettlementError::Decode(format!("unexpected block number: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("n", "0x1").unwrap(), 1);
        assert_eq!(parse_quantity("n", "0x1b4").unwrap(), 436);
        assert!(parse_quantity("n", "436").is_err());
        assert!(parse_quantity("n", "0xzz").is_err());
    }

    #[test]
    fn test_transaction_carries_no_value() {
        let target = SettlementTarget {
            contract: WalletAddress::parse("0x742d35cc6634c0532925a3b8d4c9db96c4b4d8b6").unwrap(),
            call: crate::abi::CallSignature::parse("placeEncryptedBid(uint256,uint256)").unwrap(),
            decimals: 18,
        };
        let rpc = JsonRpcSettlement::new(
            "http://127.0.0.1:8545",
            WalletAddress::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            target,
            Duration::from_secs(1),
        )
        .unwrap();

        let tx = rpc.transaction(&[0x12, 0x34]);
        assert_eq!(tx["data"], "0x1234");
        assert_eq!(tx["to"], "0x742d35cc6634c0532925a3b8d4c9db96c4b4d8b6");
        assert!(tx.get("value").is_none());
    }
}
