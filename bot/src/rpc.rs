// bot/src/rpc.rs
//! JSON-RPC access to the chain node.
//!
//! `ChainClient` is the capability the rest of the bot consumes. The default
//! implementation, [`RpcChainClient`], speaks JSON-RPC 2.0 over any ethers
//! `JsonRpcClient` transport (plain `Http` in production) and converts every
//! hex quantity itself, so a short or odd-length value from a node is decoded
//! the same way everywhere.

use crate::error::{BotError, BotResult};
use crate::utils::{de_opt_quantity, de_quantity, hex_to_u256, u256_to_hex};
use async_trait::async_trait;
use ethers::{
    providers::{Http, JsonRpcClient},
    types::{Address, Bytes, TxHash, U256},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace};

/// Read-only call description used by `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// Transaction body as returned inside blocks and by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(deserialize_with = "de_quantity")]
    pub gas: U256,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub gas_price: Option<U256>,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub block_number: Option<U256>,
}

impl ChainTransaction {
    /// Leading four calldata bytes, if the input is long enough.
    pub fn selector(&self) -> Option<[u8; 4]> {
        let head = self.input.get(..4)?;
        let mut selector = [0u8; 4];
        selector.copy_from_slice(head);
        Some(selector)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    pub transaction_hash: TxHash,
    #[serde(deserialize_with = "de_quantity")]
    pub gas_used: U256,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub effective_gas_price: Option<U256>,
    #[serde(default, deserialize_with = "de_opt_quantity")]
    pub status: Option<U256>,
    #[serde(default)]
    pub logs: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBlock {
    #[serde(deserialize_with = "de_quantity")]
    pub number: U256,
    #[serde(deserialize_with = "de_quantity")]
    pub timestamp: U256,
    #[serde(default)]
    pub transactions: Vec<ChainTransaction>,
}

/// Chain access capability used by the agent and the reconciliation scanner.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn transaction_count(&self, address: Address) -> BotResult<U256>;
    async fn gas_price(&self) -> BotResult<U256>;
    async fn estimate_gas(&self, call: &CallRequest) -> BotResult<U256>;
    /// `None` means the node gave no answer, which is not the same as zero.
    async fn balance(&self, address: Address) -> BotResult<Option<U256>>;
    async fn call(&self, call: &CallRequest) -> BotResult<Bytes>;
    async fn send_raw_transaction(&self, raw: &Bytes) -> BotResult<TxHash>;
    async fn transaction_by_hash(&self, hash: TxHash) -> BotResult<Option<ChainTransaction>>;
    async fn transaction_receipt(&self, hash: TxHash) -> BotResult<Option<ChainReceipt>>;
    async fn block_by_number(&self, number: u64) -> BotResult<Option<ChainBlock>>;
}

/// JSON-RPC backed `ChainClient`.
///
/// Request/response cycles are serialised with a mutex, so one instance can
/// be shared by every agent pointed at the same node.
#[derive(Debug)]
pub struct RpcChainClient<P = Http> {
    transport: P,
    lock: Mutex<()>,
}

impl RpcChainClient<Http> {
    pub fn connect(url: &str) -> BotResult<Self> {
        let transport: Http = url
            .parse()
            .map_err(|e| BotError::Config(format!("invalid RPC url '{}': {}", url, e)))?;
        Ok(Self::new(transport))
    }
}

impl<P: JsonRpcClient> RpcChainClient<P> {
    pub fn new(transport: P) -> Self {
        Self {
            transport,
            lock: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }

    async fn request(&self, method: &str, params: Value) -> BotResult<Value> {
        let _guard = self.lock.lock().await;
        trace!(method, %params, "RPC request");
        let result: Value = self
            .transport
            .request(method, params)
            .await
            .map_err(|e| BotError::transport(method, e))?;
        trace!(method, %result, "RPC response");
        Ok(result)
    }

    /// Request whose `result` must be present.
    async fn request_required(&self, method: &str, params: Value) -> BotResult<Value> {
        let result = self.request(method, params).await?;
        if result.is_null() {
            return Err(BotError::semantic(method, "missing result"));
        }
        Ok(result)
    }

    async fn request_quantity(&self, method: &str, params: Value) -> BotResult<U256> {
        let result = self.request_required(method, params).await?;
        parse_quantity(method, &result)
    }

    async fn request_object<T: DeserializeOwned>(&self, method: &str, params: Value) -> BotResult<Option<T>> {
        let result = self.request(method, params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| BotError::semantic(method, e))
    }
}

fn parse_quantity(method: &str, value: &Value) -> BotResult<U256> {
    let raw = value
        .as_str()
        .ok_or_else(|| BotError::semantic(method, format!("expected hex string, got {}", value)))?;
    hex_to_u256(raw).map_err(|e| BotError::semantic(method, e))
}

fn call_object(call: &CallRequest) -> Value {
    json!({
        "from": call.from,
        "to": call.to,
        "data": call.data,
    })
}

#[async_trait]
impl<P: JsonRpcClient> ChainClient for RpcChainClient<P> {
    #[instrument(skip(self), level = "debug")]
    async fn transaction_count(&self, address: Address) -> BotResult<U256> {
        self.request_quantity("eth_getTransactionCount", json!([address, "latest"]))
            .await
    }

    async fn gas_price(&self) -> BotResult<U256> {
        self.request_quantity("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, call: &CallRequest) -> BotResult<U256> {
        self.request_quantity("eth_estimateGas", json!([call_object(call)]))
            .await
    }

    async fn balance(&self, address: Address) -> BotResult<Option<U256>> {
        let method = "eth_getBalance";
        let result = self.request(method, json!([address, "latest"])).await?;
        if result.is_null() {
            debug!(%address, "balance unknown: node returned no result");
            return Ok(None);
        }
        parse_quantity(method, &result).map(Some)
    }

    async fn call(&self, call: &CallRequest) -> BotResult<Bytes> {
        let method = "eth_call";
        let result = self
            .request_required(method, json!([call_object(call), "latest"]))
            .await?;
        serde_json::from_value(result).map_err(|e| BotError::semantic(method, e))
    }

    #[instrument(skip_all, level = "debug")]
    async fn send_raw_transaction(&self, raw: &Bytes) -> BotResult<TxHash> {
        let method = "eth_sendRawTransaction";
        let result = self
            .request(method, json!([raw]))
            .await?;
        if result.is_null() {
            return Err(BotError::semantic(method, "missing transaction hash"));
        }
        serde_json::from_value(result).map_err(|e| BotError::semantic(method, e))
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> BotResult<Option<ChainTransaction>> {
        self.request_object("eth_getTransactionByHash", json!([hash]))
            .await
    }

    async fn transaction_receipt(&self, hash: TxHash) -> BotResult<Option<ChainReceipt>> {
        self.request_object("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    async fn block_by_number(&self, number: u64) -> BotResult<Option<ChainBlock>> {
        self.request_object(
            "eth_getBlockByNumber",
            json!([u256_to_hex(U256::from(number)), true]),
        )
        .await
    }
}
