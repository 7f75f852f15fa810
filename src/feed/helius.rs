//! Helius enhanced-transactions feed.
//!
//! One request per wallet against `/v0/addresses/{address}/transactions`.
//! Helius already decodes native transfers, token transfers and swap events,
//! so the records map onto [`RawTransaction`] almost field for field.

use super::{backoff, exhausted, AdaptiveRateLimiter, FeedError, TransactionFeed};
use crate::analysis::types::FeedConfig;
use crate::types::{
    AccountBalanceChange, NativeTransfer, RawInstruction, RawTransaction, TokenTransfer,
    TransactionEvents, TransactionMeta,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_retry::RetryIf;
use tracing::{debug, info, instrument, warn};

/// Helius caps the page size at 100.
const MAX_PAGE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HeliusTransaction {
    signature: String,
    timestamp: Option<i64>,
    #[serde(rename = "type")]
    tx_type: Option<String>,
    source: Option<String>,
    description: Option<String>,
    fee: u64,
    fee_payer: Option<String>,
    transaction_error: Option<serde_json::Value>,
    instructions: Vec<RawInstruction>,
    native_transfers: Vec<NativeTransfer>,
    token_transfers: Vec<TokenTransfer>,
    account_data: Vec<AccountBalanceChange>,
    events: Option<TransactionEvents>,
}

impl HeliusTransaction {
    fn into_raw(self) -> RawTransaction {
        let err = self
            .transaction_error
            .filter(|e| !e.is_null())
            .map(|e| e.to_string());

        RawTransaction {
            account_keys: self.account_data.iter().map(|d| d.account.clone()).collect(),
            signature: self.signature,
            timestamp: self.timestamp,
            fee_payer: self.fee_payer,
            tx_type: self.tx_type,
            source: self.source,
            description: self.description,
            instructions: self.instructions,
            meta: Some(TransactionMeta {
                fee: self.fee,
                err,
                ..Default::default()
            }),
            native_transfers: self.native_transfers,
            token_transfers: self.token_transfers,
            account_data: self.account_data,
            events: self.events,
        }
    }
}

/// Decode a response body, skipping records that do not parse.
fn decode_page(body: &str) -> Result<Vec<RawTransaction>, FeedError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;

    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<HeliusTransaction>(value) {
            Ok(tx) => out.push(tx.into_raw()),
            Err(e) => debug!("Skipping undecodable Helius record: {}", e),
        }
    }
    Ok(out)
}

pub struct HeliusFeed {
    http_client: Client,
    api_key: String,
    config: FeedConfig,
    rate_limiter: Mutex<AdaptiveRateLimiter>,
}

impl HeliusFeed {
    pub fn new(api_key: impl Into<String>, config: FeedConfig) -> Result<Self, FeedError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            rate_limiter: Mutex::new(AdaptiveRateLimiter::from_config(&config)),
            config,
        })
    }

    fn url(&self, address: &str, limit: usize) -> String {
        format!(
            "{}/v0/addresses/{}/transactions?api-key={}&limit={}",
            self.config.helius_api_base.trim_end_matches('/'),
            address,
            self.api_key,
            limit.clamp(1, MAX_PAGE)
        )
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, address: &str, limit: usize) -> Result<Vec<RawTransaction>, FeedError> {
        let handle = self.rate_limiter.lock().await.handle();
        handle.until_ready().await;

        let result = self.request_page(address, limit).await;

        let mut limiter = self.rate_limiter.lock().await;
        match &result {
            Err(e) if e.is_retryable() => {
                limiter.record_failure();
                warn!("Helius request for {} failed, will retry: {}", address, e);
            }
            _ => limiter.record_success(),
        }
        result
    }

    async fn request_page(&self, address: &str, limit: usize) -> Result<Vec<RawTransaction>, FeedError> {
        let response = self.http_client.get(self.url(address, limit)).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::Throttled);
        }
        if status.is_server_error() {
            return Err(FeedError::Unavailable(format!("Helius returned {}", status)));
        }
        if !status.is_success() {
            return Err(FeedError::Rpc {
                code: status.as_u16() as i64,
                message: format!("Helius returned {}", status),
            });
        }

        let body = response.text().await?;
        decode_page(&body)
    }
}

#[async_trait]
impl TransactionFeed for HeliusFeed {
    #[instrument(skip(self))]
    async fn fetch_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<RawTransaction>, FeedError> {
        let attempts = self.config.retry_attempts;
        let transactions = RetryIf::spawn(
            backoff(self.config.retry_base_delay_ms, attempts),
            || self.fetch_page(address, limit),
            |e: &FeedError| e.is_retryable(),
        )
        .await
        .map_err(|e| exhausted(e, attempts))?;

        info!("Fetched {} transactions for {} from Helius", transactions.len(), address);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"[
        {
            "signature": "5h6x",
            "timestamp": 1700000000,
            "type": "SWAP",
            "source": "JUPITER",
            "description": "wallet swapped 0.5 SOL for 250 JUP",
            "fee": 5000,
            "feePayer": "Wallet",
            "transactionError": null,
            "instructions": [
                {
                    "programId": "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
                    "accounts": ["Wallet"],
                    "data": "abc",
                    "innerInstructions": [
                        {"programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA", "accounts": [], "data": ""}
                    ]
                }
            ],
            "nativeTransfers": [
                {"fromUserAccount": "Wallet", "toUserAccount": "Pool", "amount": 500000000}
            ],
            "tokenTransfers": [
                {
                    "fromUserAccount": "Pool",
                    "toUserAccount": "Wallet",
                    "mint": "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN",
                    "tokenAmount": 250.0,
                    "tokenStandard": "Fungible"
                }
            ],
            "accountData": [
                {"account": "Wallet", "nativeBalanceChange": -500005000, "tokenBalanceChanges": []}
            ],
            "events": {}
        },
        {
            "signature": "failed",
            "timestamp": 1700000100,
            "fee": 5000,
            "transactionError": {"InstructionError": [0, "Custom"]},
            "instructions": [{"programId": "11111111111111111111111111111111", "accounts": []}]
        },
        "not an object"
    ]"#;

    #[test]
    fn test_decode_page_maps_records() {
        let txs = decode_page(PAGE).unwrap();
        assert_eq!(txs.len(), 2);

        let swap = &txs[0];
        assert_eq!(swap.signature, "5h6x");
        assert_eq!(swap.source.as_deref(), Some("JUPITER"));
        assert!(swap.succeeded());
        assert_eq!(swap.meta.as_ref().unwrap().fee, 5000);
        assert_eq!(swap.all_instructions().len(), 2);
        assert_eq!(swap.native_transfers[0].amount, 500_000_000);
        assert_eq!(swap.token_transfers[0].token_amount, 250.0);
        assert_eq!(swap.account_keys, vec!["Wallet".to_string()]);

        assert!(!txs[1].succeeded());
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(matches!(decode_page("{}"), Err(FeedError::Decode(_))));
    }

    #[test]
    fn test_url_clamps_limit() {
        let feed = HeliusFeed::new("key", FeedConfig::default()).unwrap();
        assert_eq!(
            feed.url("Wallet", 500),
            "https://api.helius.xyz/v0/addresses/Wallet/transactions?api-key=key&limit=100"
        );
    }

    #[test]
    fn test_decoded_swap_classifies() {
        use crate::analysis::TradeClassifier;
        use crate::types::TradeType;

        let txs = decode_page(PAGE).unwrap();
        let trade = TradeClassifier::default().classify(&txs[0], "Wallet").unwrap();

        assert_eq!(trade.trade_type, TradeType::Acquisition);
        assert_eq!(trade.asset, "JUP");
        assert_eq!(trade.venue, "Jupiter");
    }
}
