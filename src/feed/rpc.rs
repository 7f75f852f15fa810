//! Plain JSON-RPC feed.
//!
//! Lists signatures with `getSignaturesForAddress`, then fetches each
//! transaction with `getTransaction` (jsonParsed) in small batches: a short
//! stagger between requests inside a batch, a longer pause between batches,
//! a semaphore bounding in-flight requests and the adaptive limiter on top.
//! Token balance changes and parsed system transfers are turned into the
//! same transfer legs the enhanced feed reports.

use super::{backoff, exhausted, AdaptiveRateLimiter, FeedError, TransactionFeed};
use crate::analysis::types::FeedConfig;
use crate::types::{NativeTransfer, RawInstruction, RawTransaction, TokenTransfer, TransactionMeta};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_retry::RetryIf;
use tracing::{debug, info, instrument, warn};

/// JSON-RPC error codes nodes use for throttling.
const RATE_LIMIT_CODES: &[i64] = &[429, -32005];

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcTransaction {
    block_time: Option<i64>,
    meta: Option<RpcMeta>,
    transaction: RpcTransactionBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcMeta {
    err: Option<Value>,
    fee: u64,
    pre_balances: Vec<u64>,
    post_balances: Vec<u64>,
    log_messages: Option<Vec<String>>,
    inner_instructions: Option<Vec<RpcInnerInstructions>>,
    pre_token_balances: Option<Vec<RpcTokenBalance>>,
    post_token_balances: Option<Vec<RpcTokenBalance>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcInnerInstructions {
    index: usize,
    instructions: Vec<RpcInstruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcTokenBalance {
    owner: Option<String>,
    mint: String,
    ui_token_amount: RpcUiAmount,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcUiAmount {
    ui_amount_string: Option<String>,
    ui_amount: Option<f64>,
}

impl RpcUiAmount {
    fn value(&self) -> f64 {
        self.ui_amount
            .or_else(|| self.ui_amount_string.as_deref().and_then(|s| s.parse().ok()))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RpcTransactionBody {
    signatures: Vec<String>,
    message: RpcMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcMessage {
    account_keys: Vec<RpcAccountKey>,
    instructions: Vec<RpcInstruction>,
}

/// jsonParsed account keys are objects; legacy encodings send bare strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RpcAccountKey {
    Parsed { pubkey: String },
    Plain(String),
}

impl RpcAccountKey {
    fn pubkey(&self) -> &str {
        match self {
            RpcAccountKey::Parsed { pubkey } => pubkey,
            RpcAccountKey::Plain(key) => key,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RpcInstruction {
    program_id: String,
    accounts: Vec<String>,
    data: Option<String>,
    parsed: Option<Value>,
}

impl RpcInstruction {
    fn into_raw(self, inner: Vec<RawInstruction>) -> RawInstruction {
        RawInstruction {
            program_id: self.program_id,
            accounts: self.accounts,
            data: self.data,
            // Some programs come back parsed as a bare string; only objects carry a type
            parsed: self.parsed.filter(|p| p.is_object()),
            inner_instructions: inner,
        }
    }
}

impl RpcTransaction {
    fn into_raw(self, signature: &str) -> RawTransaction {
        let account_keys: Vec<String> = self
            .transaction
            .message
            .account_keys
            .iter()
            .map(|k| k.pubkey().to_string())
            .collect();
        let signature = self
            .transaction
            .signatures
            .first()
            .cloned()
            .unwrap_or_else(|| signature.to_string());

        let Some(meta) = self.meta else {
            return RawTransaction {
                signature,
                timestamp: self.block_time,
                fee_payer: account_keys.first().cloned(),
                account_keys,
                ..Default::default()
            };
        };

        let mut inner_by_index: HashMap<usize, Vec<RawInstruction>> = HashMap::new();
        for group in meta.inner_instructions.unwrap_or_default() {
            inner_by_index.insert(
                group.index,
                group
                    .instructions
                    .into_iter()
                    .map(|ix| ix.into_raw(Vec::new()))
                    .collect(),
            );
        }
        let instructions: Vec<RawInstruction> = self
            .transaction
            .message
            .instructions
            .into_iter()
            .enumerate()
            .map(|(i, ix)| ix.into_raw(inner_by_index.remove(&i).unwrap_or_default()))
            .collect();

        let token_transfers = token_legs(
            meta.pre_token_balances.as_deref().unwrap_or_default(),
            meta.post_token_balances.as_deref().unwrap_or_default(),
        );

        let mut raw = RawTransaction {
            signature,
            timestamp: self.block_time,
            fee_payer: account_keys.first().cloned(),
            account_keys,
            instructions,
            meta: Some(TransactionMeta {
                fee: meta.fee,
                err: meta.err.filter(|e| !e.is_null()).map(|e| e.to_string()),
                pre_balances: meta.pre_balances,
                post_balances: meta.post_balances,
                log_messages: meta.log_messages.unwrap_or_default(),
            }),
            token_transfers,
            ..Default::default()
        };
        raw.native_transfers = native_legs(&raw);
        raw
    }
}

/// Per-owner token balance changes as transfer legs.
fn token_legs(pre: &[RpcTokenBalance], post: &[RpcTokenBalance]) -> Vec<TokenTransfer> {
    let mut deltas: Vec<((String, String), f64)> = Vec::new();
    let mut apply = |balance: &RpcTokenBalance, sign: f64| {
        let Some(owner) = balance.owner.clone() else {
            return;
        };
        let key = (owner, balance.mint.clone());
        let amount = balance.ui_token_amount.value() * sign;
        match deltas.iter_mut().find(|(k, _)| *k == key) {
            Some((_, delta)) => *delta += amount,
            None => deltas.push((key, amount)),
        }
    };
    for balance in pre {
        apply(balance, -1.0);
    }
    for balance in post {
        apply(balance, 1.0);
    }

    deltas
        .into_iter()
        .filter(|(_, delta)| delta.abs() > f64::EPSILON)
        .map(|((owner, mint), delta)| {
            let (from, to) = if delta > 0.0 {
                (None, Some(owner))
            } else {
                (Some(owner), None)
            };
            TokenTransfer {
                from_user_account: from,
                to_user_account: to,
                mint,
                token_amount: delta.abs(),
                token_symbol: None,
            }
        })
        .collect()
}

/// Parsed system transfers anywhere in the instruction tree.
fn native_legs(tx: &RawTransaction) -> Vec<NativeTransfer> {
    tx.all_instructions()
        .into_iter()
        .filter_map(|ix| {
            let parsed = ix.parsed.as_ref()?;
            if parsed.get("type")?.as_str()? != "transfer" {
                return None;
            }
            let info = parsed.get("info")?;
            Some(NativeTransfer {
                from_user_account: info.get("source")?.as_str().map(str::to_string),
                to_user_account: info.get("destination")?.as_str().map(str::to_string),
                amount: i64::try_from(info.get("lamports")?.as_u64()?).ok()?,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct RpcFeed {
    http_client: Client,
    config: FeedConfig,
    semaphore: Arc<Semaphore>,
    rate_limiter: Arc<Mutex<AdaptiveRateLimiter>>,
}

impl RpcFeed {
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            semaphore: Arc::new(Semaphore::new(config.max_parallel_requests.max(1))),
            rate_limiter: Arc::new(Mutex::new(AdaptiveRateLimiter::from_config(&config))),
            config,
        })
    }

    /// One JSON-RPC round trip, rate limited and counted toward the adaptive window.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, FeedError> {
        let handle = self.rate_limiter.lock().await.handle();
        handle.until_ready().await;

        let result = self.send(method, params).await;

        let mut limiter = self.rate_limiter.lock().await;
        if matches!(&result, Err(e) if e.is_retryable()) {
            limiter.record_failure();
            let stats = limiter.stats();
            debug!(
                "RPC {} failed; quota {}/{} req/s, error rate {:.0}% over {} calls",
                method,
                stats.current_quota,
                stats.base_quota,
                stats.error_rate * 100.0,
                stats.samples
            );
        } else {
            limiter.record_success();
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>, FeedError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.config.rpc_endpoint)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::Throttled);
        }
        if status.is_server_error() {
            return Err(FeedError::Unavailable(format!("{} returned {}", method, status)));
        }

        let text = response.text().await?;
        decode_rpc(&text)
    }

    async fn call_with_retry<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, FeedError> {
        let attempts = self.config.retry_attempts;
        RetryIf::spawn(
            backoff(self.config.retry_base_delay_ms, attempts),
            || self.call(method, params.clone()),
            |e: &FeedError| e.is_retryable(),
        )
        .await
        .map_err(|e| exhausted(e, attempts))
    }

    #[instrument(skip(self))]
    async fn signatures(&self, address: &str, limit: usize) -> Result<Vec<String>, FeedError> {
        let infos: Vec<SignatureInfo> = self
            .call_with_retry(
                "getSignaturesForAddress",
                json!([address, {"limit": limit.max(1)}]),
            )
            .await?
            .unwrap_or_default();

        Ok(infos.into_iter().map(|i| i.signature).collect())
    }

    #[instrument(skip(self))]
    async fn transaction(&self, signature: &str) -> Result<Option<RawTransaction>, FeedError> {
        let tx: Option<RpcTransaction> = self
            .call_with_retry(
                "getTransaction",
                json!([signature, {
                    "encoding": "jsonParsed",
                    "maxSupportedTransactionVersion": 0,
                    "commitment": "confirmed"
                }]),
            )
            .await?;

        Ok(tx.map(|t| t.into_raw(signature)))
    }

    /// Fetch one batch concurrently, keeping signature order.
    async fn fetch_batch(&self, batch: &[String]) -> Result<Vec<RawTransaction>, FeedError> {
        let mut tasks = JoinSet::new();

        for (position, signature) in batch.iter().cloned().enumerate() {
            let feed = self.clone();
            let stagger = Duration::from_millis(self.config.request_delay_ms * position as u64);
            tasks.spawn(async move {
                tokio::time::sleep(stagger).await;
                let _permit = feed.semaphore.acquire().await;
                (position, signature.clone(), feed.transaction(&signature).await)
            });
        }

        let mut fetched: Vec<(usize, RawTransaction)> = Vec::with_capacity(batch.len());
        while let Some(joined) = tasks.join_next().await {
            let (position, signature, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Transaction fetch task failed: {}", e);
                    continue;
                }
            };

            match result {
                Ok(Some(tx)) => fetched.push((position, tx)),
                Ok(None) => debug!("Transaction {} not found", signature),
                Err(e) if e.is_rate_limit() => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => warn!("Skipping transaction {}: {}", signature, e),
            }
        }

        fetched.sort_by_key(|(position, _)| *position);
        Ok(fetched.into_iter().map(|(_, tx)| tx).collect())
    }
}

/// Decode a JSON-RPC envelope, mapping throttling codes to [`FeedError::Throttled`].
fn decode_rpc<T: DeserializeOwned>(text: &str) -> Result<Option<T>, FeedError> {
    let envelope: RpcResponse<T> =
        serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;

    if let Some(error) = envelope.error {
        if RATE_LIMIT_CODES.contains(&error.code) {
            return Err(FeedError::Throttled);
        }
        return Err(FeedError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    Ok(envelope.result)
}

#[async_trait]
impl TransactionFeed for RpcFeed {
    #[instrument(skip(self))]
    async fn fetch_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, FeedError> {
        let signatures = self.signatures(address, limit).await?;
        if signatures.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size.max(1);
        let mut transactions = Vec::with_capacity(signatures.len());

        for (i, batch) in signatures.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_batch_delay_ms)).await;
            }
            transactions.extend(self.fetch_batch(batch).await?);
        }

        info!(
            "Fetched {} of {} transactions for {} over RPC",
            transactions.len(),
            signatures.len(),
            address
        );
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "Wa11et1111111111111111111111111111111111111";

    fn parsed_transaction() -> Value {
        json!({
            "blockTime": 1700000000,
            "meta": {
                "err": null,
                "fee": 5000,
                "preBalances": [2000000000u64, 0],
                "postBalances": [1499995000u64, 500000000u64],
                "logMessages": ["Program log: Instruction: Route"],
                "innerInstructions": [{
                    "index": 0,
                    "instructions": [{
                        "programId": "11111111111111111111111111111111",
                        "program": "system",
                        "parsed": {
                            "type": "transfer",
                            "info": {"source": WALLET, "destination": "Pool", "lamports": 500000000u64}
                        }
                    }]
                }],
                "preTokenBalances": [
                    {"owner": WALLET, "mint": "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN",
                     "uiTokenAmount": {"uiAmount": 10.0, "uiAmountString": "10"}}
                ],
                "postTokenBalances": [
                    {"owner": WALLET, "mint": "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN",
                     "uiTokenAmount": {"uiAmount": 260.0, "uiAmountString": "260"}}
                ]
            },
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        {"pubkey": WALLET, "signer": true, "writable": true},
                        {"pubkey": "Pool", "signer": false, "writable": true}
                    ],
                    "instructions": [{
                        "programId": "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
                        "accounts": [WALLET, "Pool"],
                        "data": "3Bxs"
                    }]
                }
            }
        })
    }

    #[test]
    fn test_rpc_transaction_mapping() {
        let tx: RpcTransaction = serde_json::from_value(parsed_transaction()).unwrap();
        let raw = tx.into_raw("sig1");

        assert_eq!(raw.signature, "sig1");
        assert_eq!(raw.fee_payer.as_deref(), Some(WALLET));
        assert_eq!(raw.account_keys.len(), 2);
        assert_eq!(raw.all_instructions().len(), 2);
        assert!(raw.succeeded());
        assert_eq!(raw.native_transfers.len(), 1);
        assert_eq!(raw.native_transfers[0].amount, 500_000_000);
        assert_eq!(raw.token_transfers.len(), 1);
        assert_eq!(raw.token_transfers[0].token_amount, 250.0);
        assert_eq!(raw.token_transfers[0].to_user_account.as_deref(), Some(WALLET));
    }

    #[test]
    fn test_rpc_transaction_classifies_as_swap() {
        use crate::analysis::TradeClassifier;
        use crate::types::TradeType;

        let tx: RpcTransaction = serde_json::from_value(parsed_transaction()).unwrap();
        let trade = TradeClassifier::default()
            .classify(&tx.into_raw("sig1"), WALLET)
            .unwrap();

        assert_eq!(trade.trade_type, TradeType::Acquisition);
        assert_eq!(trade.asset, "JUP");
        assert_eq!(trade.amount, 250.0);
        assert!((trade.unit_price - 0.002).abs() < 1e-12);
        assert_eq!(trade.venue, "Jupiter");
    }

    #[test]
    fn test_missing_meta_maps_to_unclassifiable() {
        let mut value = parsed_transaction();
        value["meta"] = Value::Null;
        let raw = serde_json::from_value::<RpcTransaction>(value).unwrap().into_raw("sig1");

        assert!(raw.meta.is_none());
        assert!(raw.instructions.is_empty());
    }

    #[test]
    fn test_decode_rpc_errors() {
        let throttled = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"slow down"}}"#;
        assert!(matches!(decode_rpc::<Value>(throttled), Err(FeedError::Throttled)));

        let invalid = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"bad"}}"#;
        assert!(matches!(
            decode_rpc::<Value>(invalid),
            Err(FeedError::Rpc { code: -32602, .. })
        ));

        let missing = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        assert!(decode_rpc::<Value>(missing).unwrap().is_none());

        assert!(matches!(decode_rpc::<Value>("nope"), Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_token_legs_net_out() {
        let balance = |owner: &str, amount: f64| RpcTokenBalance {
            owner: Some(owner.to_string()),
            mint: "mint".to_string(),
            ui_token_amount: RpcUiAmount {
                ui_amount_string: None,
                ui_amount: Some(amount),
            },
        };

        let legs = token_legs(
            &[balance("a", 5.0), balance("b", 1.0)],
            &[balance("a", 2.0), balance("b", 1.0)],
        );
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].from_user_account.as_deref(), Some("a"));
        assert_eq!(legs[0].token_amount, 3.0);
    }
}
