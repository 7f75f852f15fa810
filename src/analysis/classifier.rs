//! Transaction classifier.
//!
//! Turns one raw transaction into at most one [`Trade`] for a given account.
//! The paths are tried in order: an explicit swap (structured event, or a token
//! leg paired with a native leg), a parsed native transfer, and finally the
//! account's native balance delta. Anything that cannot be read is "not a
//! trade", never an error for the caller.

use super::types::ClassifierConfig;
use super::venue::detect_venue;
use crate::oracle::reference::WRAPPED_NATIVE_MINT;
use crate::oracle::{ReferencePrices, StaticReferencePrices};
use crate::types::{RawTransaction, SwapEvent, TokenTransfer, Trade, TradeType};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why a transaction could not be read. Never leaves this module.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("malformed transaction: {0}")]
    Malformed(String),
}

/// Intermediate result of one classification path.
#[derive(Debug, Clone)]
struct Candidate {
    trade_type: TradeType,
    asset: String,
    amount: f64,
    unit_price: f64,
    /// Size of the native leg, in native units, when there is one
    native_amount: Option<f64>,
    kind: &'static str,
}

pub struct TradeClassifier {
    config: ClassifierConfig,
    prices: Arc<dyn ReferencePrices>,
}

impl TradeClassifier {
    pub fn new(config: ClassifierConfig, prices: Arc<dyn ReferencePrices>) -> Self {
        Self { config, prices }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one transaction from the point of view of `account`.
    pub fn classify(&self, tx: &RawTransaction, account: &str) -> Option<Trade> {
        match self.try_classify(tx, account) {
            Ok(trade) => trade,
            Err(e) => {
                debug!(signature = %tx.signature, "Skipping transaction: {}", e);
                None
            }
        }
    }

    /// Classify a batch, dropping non-trades. Output is sorted oldest first.
    pub fn classify_all(&self, txs: &[RawTransaction], account: &str) -> Vec<Trade> {
        let mut trades: Vec<Trade> = txs
            .iter()
            .filter_map(|tx| self.classify(tx, account))
            .collect();
        trades.sort_by_key(|t| t.timestamp);
        trades
    }

    fn try_classify(
        &self,
        tx: &RawTransaction,
        account: &str,
    ) -> Result<Option<Trade>, ClassifyError> {
        if tx.instructions.is_empty() || tx.meta.is_none() {
            return Ok(None);
        }

        let seconds = tx.timestamp.ok_or(ClassifyError::MissingField("timestamp"))?;
        let timestamp: DateTime<Utc> = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| ClassifyError::Malformed(format!("timestamp {} out of range", seconds)))?;

        let candidate = match self.swap_candidate(tx, account) {
            Some(c) => Some(c),
            None => match self.transfer_candidate(tx, account)? {
                Some(c) => Some(c),
                None => self.balance_candidate(tx, account)?,
            },
        };

        let Some(candidate) = candidate else {
            return Ok(None);
        };

        if !candidate.amount.is_finite() || candidate.amount <= 0.0 {
            debug!(signature = %tx.signature, "Discarding non-positive amount");
            return Ok(None);
        }

        let dust_measure = candidate.native_amount.unwrap_or(candidate.amount);
        if dust_measure < self.config.dust_threshold {
            debug!(
                signature = %tx.signature,
                "Discarding dust {} below {}", dust_measure, self.config.dust_threshold
            );
            return Ok(None);
        }

        let venue = detect_venue(tx);
        let notes = format!(
            "{} {} {} on {}",
            candidate.kind, candidate.trade_type, candidate.asset, venue
        );

        Ok(Some(
            Trade::new(
                tx.signature.clone(),
                timestamp,
                candidate.trade_type,
                candidate.asset,
                candidate.amount,
                candidate.unit_price,
                venue,
                tx.succeeded(),
            )
            .with_notes(notes),
        ))
    }

    // --- Swap path ---

    fn swap_candidate(&self, tx: &RawTransaction, account: &str) -> Option<Candidate> {
        if let Some(swap) = tx.events.as_ref().and_then(|e| e.swap.as_ref()) {
            if let Some(c) = self.swap_event_candidate(swap, account) {
                return Some(c);
            }
        }
        self.transfer_pair_candidate(tx, account)
    }

    /// Structured swap event: native in with token out, or token in with native out.
    fn swap_event_candidate(&self, swap: &SwapEvent, account: &str) -> Option<Candidate> {
        let (trade_type, native, legs) = match (&swap.native_input, &swap.native_output) {
            (Some(input), _) if !swap.token_outputs.is_empty() => {
                (TradeType::Acquisition, input, &swap.token_outputs)
            }
            (_, Some(output)) if !swap.token_inputs.is_empty() => {
                (TradeType::Disposition, output, &swap.token_inputs)
            }
            _ => return None,
        };

        // The account must be the native party or own the token leg
        let leg = match legs.iter().find(|l| l.user_account.as_deref() == Some(account)) {
            Some(leg) => leg,
            None if native.account == account => legs.first()?,
            None => return None,
        };
        let amount = leg.ui_amount()?.abs();
        let asset = leg
            .symbol
            .clone()
            .or_else(|| self.prices.symbol_for_mint(&leg.mint))
            .unwrap_or_else(|| leg.mint.clone());
        let native_amount = native.amount.unsigned_abs() as f64 / self.config.lamports_per_native;

        Some(self.priced(trade_type, asset, amount, Some(native_amount), "swap"))
    }

    /// A token leg paired with a native leg (native transfers or wrapped-native tokens).
    fn transfer_pair_candidate(&self, tx: &RawTransaction, account: &str) -> Option<Candidate> {
        let token_legs: Vec<&TokenTransfer> = tx
            .token_transfers
            .iter()
            .filter(|t| t.mint != WRAPPED_NATIVE_MINT)
            .collect();
        if token_legs.is_empty() {
            return None;
        }

        let mut sent: i128 = 0;
        let mut received: i128 = 0;
        let mut has_native_leg = false;

        for transfer in &tx.native_transfers {
            has_native_leg = true;
            let lamports = transfer.amount.unsigned_abs() as i128;
            if transfer.from_user_account.as_deref() == Some(account) {
                sent += lamports;
            }
            if transfer.to_user_account.as_deref() == Some(account) {
                received += lamports;
            }
        }
        for wrapped in tx.token_transfers.iter().filter(|t| t.mint == WRAPPED_NATIVE_MINT) {
            has_native_leg = true;
            let lamports = (wrapped.token_amount.abs() * self.config.lamports_per_native) as i128;
            if wrapped.from_user_account.as_deref() == Some(account) {
                sent += lamports;
            }
            if wrapped.to_user_account.as_deref() == Some(account) {
                received += lamports;
            }
        }

        if !has_native_leg {
            return None;
        }

        let owned = token_legs.iter().find(|t| {
            t.from_user_account.as_deref() == Some(account)
                || t.to_user_account.as_deref() == Some(account)
        });
        let token = match owned {
            Some(token) => token,
            None if sent > 0 || received > 0 => token_legs.first()?,
            None => return None,
        };

        let net = received - sent;
        let trade_type = if net < 0 {
            TradeType::Acquisition
        } else if net > 0 {
            TradeType::Disposition
        } else if token.from_user_account.as_deref() == Some(account) {
            TradeType::Disposition
        } else {
            TradeType::Acquisition
        };

        let native_amount = (net != 0).then(|| net.unsigned_abs() as f64 / self.config.lamports_per_native);
        let asset = token
            .token_symbol
            .clone()
            .or_else(|| self.prices.symbol_for_mint(&token.mint))
            .unwrap_or_else(|| token.mint.clone());

        Some(self.priced(trade_type, asset, token.token_amount.abs(), native_amount, "swap"))
    }

    /// Unit price from the native leg, else the reference table, else the default.
    fn priced(
        &self,
        trade_type: TradeType,
        asset: String,
        amount: f64,
        native_amount: Option<f64>,
        kind: &'static str,
    ) -> Candidate {
        let unit_price = match native_amount {
            Some(native) if native > 0.0 && amount > 0.0 => native / amount,
            _ => self
                .prices
                .reference_price(&asset)
                .unwrap_or(self.config.default_unit_price),
        };

        Candidate {
            trade_type,
            asset,
            amount,
            unit_price,
            native_amount,
            kind,
        }
    }

    // --- Native transfer path ---

    fn transfer_candidate(
        &self,
        tx: &RawTransaction,
        account: &str,
    ) -> Result<Option<Candidate>, ClassifyError> {
        for ix in tx.all_instructions() {
            let Some(parsed) = ix.parsed.as_ref() else {
                continue;
            };
            if parsed.get("type").and_then(|t| t.as_str()) != Some("transfer") {
                continue;
            }
            let Some(info) = parsed.get("info") else {
                continue;
            };
            // Token-program transfers carry an amount string instead of lamports
            let Some(lamports) = info.get("lamports") else {
                continue;
            };

            let lamports = lamports
                .as_u64()
                .ok_or_else(|| ClassifyError::Malformed("lamports is not an integer".to_string()))?;
            let source = info.get("source").and_then(|v| v.as_str());
            let destination = info.get("destination").and_then(|v| v.as_str());

            let trade_type = if source == Some(account) {
                TradeType::Disposition
            } else if destination == Some(account) {
                TradeType::Acquisition
            } else {
                continue;
            };

            let amount = lamports as f64 / self.config.lamports_per_native;
            let asset = self.config.native_symbol.clone();
            let unit_price = self
                .prices
                .reference_price(&asset)
                .unwrap_or(self.config.default_unit_price);

            return Ok(Some(Candidate {
                trade_type,
                asset,
                amount,
                unit_price,
                native_amount: Some(amount),
                kind: "transfer",
            }));
        }

        Ok(None)
    }

    // --- Balance delta path ---

    fn balance_candidate(
        &self,
        tx: &RawTransaction,
        account: &str,
    ) -> Result<Option<Candidate>, ClassifyError> {
        let meta = tx.meta.as_ref().ok_or(ClassifyError::MissingField("meta"))?;

        let index = tx.account_keys.iter().position(|k| k == account);
        let pays_fee = match tx.fee_payer.as_deref() {
            Some(payer) => payer == account,
            None => index == Some(0),
        };
        let fee = if pays_fee { meta.fee as i128 } else { 0 };

        let raw_delta: i128 = match index {
            Some(i) if i < meta.pre_balances.len() && i < meta.post_balances.len() => {
                meta.post_balances[i] as i128 - meta.pre_balances[i] as i128
            }
            _ => tx
                .account_data
                .iter()
                .find(|d| d.account == account)
                .map(|d| d.native_balance_change as i128)
                .ok_or(ClassifyError::MissingField("account balance"))?,
        };

        // The fee comes out of the payer's balance; add it back to isolate the trade
        let net = raw_delta + fee;

        let (trade_type, lamports, kind) = if net > 0 {
            (TradeType::Acquisition, net, "balance change")
        } else if net < 0 {
            (TradeType::Disposition, -net, "balance change")
        } else {
            (TradeType::Disposition, fee, "fee only")
        };

        let amount = lamports as f64 / self.config.lamports_per_native;
        let asset = self.config.native_symbol.clone();
        let unit_price = self
            .prices
            .reference_price(&asset)
            .unwrap_or(self.config.default_unit_price);

        Ok(Some(Candidate {
            trade_type,
            asset,
            amount,
            unit_price,
            native_amount: Some(amount),
            kind,
        }))
    }
}

impl Default for TradeClassifier {
    fn default() -> Self {
        Self::new(
            ClassifierConfig::default(),
            Arc::new(StaticReferencePrices::new()),
        )
    }
}
