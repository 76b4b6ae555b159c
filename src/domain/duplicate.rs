//! Cross-import duplicate detection.
//!
//! A fill matches a recorded execution when both carry a broker fill id and
//! the ids are equal. Without ids on both sides the match is fuzzy: same
//! quantity, prices within a cent, timestamps within a second.

use std::collections::HashMap;

use super::trade::{SeedPosition, Trade};
use super::transaction::Transaction;

pub const TIME_TOLERANCE_MS: i64 = 1000;
pub const PRICE_TOLERANCE: f64 = 0.01;

pub fn is_duplicate(fill: &Transaction, symbol: &str, history: &ExecutionHistory) -> bool {
    history
        .for_symbol(symbol)
        .iter()
        .any(|prior| same_execution(fill, prior))
}

pub fn same_execution(fill: &Transaction, prior: &Transaction) -> bool {
    if let (Some(a), Some(b)) = (&fill.broker_fill_id, &prior.broker_fill_id) {
        return a == b;
    }
    // Broken history records (NaN prices) never match.
    if !fill.price.is_finite() || !prior.price.is_finite() {
        return false;
    }
    let gap_ms = (fill.timestamp - prior.timestamp).num_milliseconds().abs();
    gap_ms <= TIME_TOLERANCE_MS
        && fill.reported_quantity() == prior.reported_quantity()
        && (fill.price - prior.price).abs() < PRICE_TOLERANCE
}

/// Every execution the caller has already recorded, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    by_symbol: HashMap<String, Vec<Transaction>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, execution: Transaction) {
        self.by_symbol
            .entry(execution.symbol.clone())
            .or_default()
            .push(execution);
    }

    pub fn extend(&mut self, executions: impl IntoIterator<Item = Transaction>) {
        for execution in executions {
            self.record(execution);
        }
    }

    /// Adds the executions of completed or still-open trades.
    pub fn record_trades<'a>(&mut self, trades: impl IntoIterator<Item = &'a Trade>) {
        for trade in trades {
            self.extend(trade.executions.iter().cloned());
        }
    }

    pub fn record_seeds<'a>(&mut self, seeds: impl IntoIterator<Item = &'a SeedPosition>) {
        for seed in seeds {
            self.extend(seed.executions.iter().cloned());
        }
    }

    pub fn for_symbol(&self, symbol: &str) -> &[Transaction] {
        self.by_symbol
            .get(symbol)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_symbol.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
