//! Core types and data structures shared across the trade-lens pipeline.
//!
//! `RawTransaction` is the canonical shape every transaction source is mapped
//! into before classification. `Trade` is the only record the classifier emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A simple public key representation (base58 string)
pub type Pubkey = String;

/// Marker carried in the notes of every synthesized trade.
pub const DEMO_MARKER: &str = "[DEMO DATA]";

/// Direction of a trade from the wallet's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    /// The wallet gained the asset (a buy)
    Acquisition,
    /// The wallet gave up the asset (a sell)
    Disposition,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Acquisition => "acquisition",
            TradeType::Disposition => "disposition",
        }
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reconstructed trade.
///
/// Created by the classifier (or the fallback synthesizer) and never mutated
/// afterwards; `total_value` is always `amount * unit_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Transaction signature (or a synthetic id)
    pub id: String,
    /// Block time of the originating transaction
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    /// Asset symbol, or mint address when no symbol is known
    pub asset: String,
    pub amount: f64,
    /// Price per unit; derived from the native leg when available
    pub unit_price: f64,
    pub total_value: f64,
    /// Exchange program or transfer mechanism
    pub venue: String,
    /// Mirrors the success flag of the originating transaction
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Trade {
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        trade_type: TradeType,
        asset: impl Into<String>,
        amount: f64,
        unit_price: f64,
        venue: impl Into<String>,
        successful: bool,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            trade_type,
            asset: asset.into(),
            amount,
            unit_price,
            total_value: amount * unit_price,
            venue: venue.into(),
            successful,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn is_acquisition(&self) -> bool {
        self.trade_type == TradeType::Acquisition
    }

    pub fn is_disposition(&self) -> bool {
        self.trade_type == TradeType::Disposition
    }

    /// True when the trade came from the fallback synthesizer.
    pub fn is_synthetic(&self) -> bool {
        self.notes
            .as_deref()
            .map(|n| n.contains(DEMO_MARKER))
            .unwrap_or(false)
    }

    /// Value used by the analytics. Malformed records (negative or non-finite
    /// figures) contribute zero instead of failing the whole aggregation.
    pub fn effective_value(&self) -> f64 {
        let well_formed = self.amount.is_finite()
            && self.unit_price.is_finite()
            && self.total_value.is_finite()
            && self.amount > 0.0
            && self.unit_price >= 0.0
            && self.total_value >= 0.0;

        if well_formed {
            self.total_value
        } else {
            0.0
        }
    }

    /// Cash-flow contribution: acquisitions cost, dispositions return.
    pub fn cash_flow(&self) -> f64 {
        match self.trade_type {
            TradeType::Acquisition => -self.effective_value(),
            TradeType::Disposition => self.effective_value(),
        }
    }

    /// Amount used by the analytics, zero for malformed records.
    pub fn effective_amount(&self) -> f64 {
        if self.amount.is_finite() && self.amount > 0.0 {
            self.amount
        } else {
            0.0
        }
    }
}

// --- Raw transaction model (consumed, never produced, by the core) ---

/// Raw parsed transaction for one account, normalized from whichever feed
/// produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTransaction {
    pub signature: String,
    /// Block time in unix seconds
    pub timestamp: Option<i64>,
    pub fee_payer: Option<Pubkey>,
    /// Feed-level transaction type label (e.g. "SWAP", "TRANSFER")
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    /// Feed-level program/source label (e.g. "JUPITER")
    pub source: Option<String>,
    pub description: Option<String>,
    /// Account keys in transaction order; indexes line up with the meta balances
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<RawInstruction>,
    pub meta: Option<TransactionMeta>,
    pub native_transfers: Vec<NativeTransfer>,
    pub token_transfers: Vec<TokenTransfer>,
    /// Per-account native balance changes, when the feed reports deltas directly
    pub account_data: Vec<AccountBalanceChange>,
    pub events: Option<TransactionEvents>,
}

impl RawTransaction {
    /// Whether the transaction executed without error. Missing meta counts as failed.
    pub fn succeeded(&self) -> bool {
        self.meta.as_ref().map(|m| m.err.is_none()).unwrap_or(false)
    }

    /// All instructions, outer first then their inner instructions, depth-first.
    pub fn all_instructions(&self) -> Vec<&RawInstruction> {
        fn walk<'a>(ixs: &'a [RawInstruction], out: &mut Vec<&'a RawInstruction>) {
            for ix in ixs {
                out.push(ix);
                walk(&ix.inner_instructions, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.instructions, &mut out);
        out
    }

    pub fn logs(&self) -> &[String] {
        self.meta
            .as_ref()
            .map(|m| m.log_messages.as_slice())
            .unwrap_or(&[])
    }
}

/// One instruction with its invoking program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Option<String>,
    /// jsonParsed payload (`{"type": "...", "info": {...}}`) when the node decoded it
    pub parsed: Option<serde_json::Value>,
    pub inner_instructions: Vec<RawInstruction>,
}

/// Execution metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionMeta {
    /// Fee in lamports, charged to the fee payer
    pub fee: u64,
    pub err: Option<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub log_messages: Vec<String>,
}

/// Native asset movement between two user accounts, in lamports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeTransfer {
    pub from_user_account: Option<Pubkey>,
    pub to_user_account: Option<Pubkey>,
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
}

/// Fungible token movement, already scaled to UI units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenTransfer {
    pub from_user_account: Option<Pubkey>,
    pub to_user_account: Option<Pubkey>,
    pub mint: Pubkey,
    pub token_amount: f64,
    pub token_symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountBalanceChange {
    pub account: Pubkey,
    pub native_balance_change: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionEvents {
    pub swap: Option<SwapEvent>,
}

/// Structured swap event with its input and output legs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwapEvent {
    pub native_input: Option<NativeAmount>,
    pub native_output: Option<NativeAmount>,
    pub token_inputs: Vec<TokenAmount>,
    pub token_outputs: Vec<TokenAmount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeAmount {
    pub account: Pubkey,
    /// Lamports; feeds send this as a string or a number
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenAmount {
    pub user_account: Option<Pubkey>,
    pub mint: Pubkey,
    pub symbol: Option<String>,
    pub raw_token_amount: RawTokenAmount,
}

impl TokenAmount {
    /// Amount scaled by the mint decimals.
    pub fn ui_amount(&self) -> Option<f64> {
        let raw: f64 = self.raw_token_amount.token_amount.parse().ok()?;
        Some(raw / 10f64.powi(self.raw_token_amount.decimals as i32))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTokenAmount {
    pub token_amount: String,
    pub decimals: u8,
}

/// Accepts integers, floats and numeric strings. Anything else becomes zero.
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    })
}
