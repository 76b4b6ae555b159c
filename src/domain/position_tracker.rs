//! Per-symbol position tracking and trade reconstruction.
//!
//! Fills are replayed in timestamp order against a signed running position.
//! A trade opens when the position leaves zero and closes when it returns to
//! exactly zero. A fill that would carry the position through zero is split
//! at the crossing: the closing leg finishes the current trade and the
//! remainder opens a new one on the other side. Fills already present in the
//! caller's execution history are skipped entirely, both from the execution
//! list and from the position arithmetic, so re-importing a file is a no-op.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::duplicate::{ExecutionHistory, is_duplicate};
use super::instrument::{Instrument, classify_as_of};
use super::trade::{SeedPosition, Side, Trade, TradeOrigin, percent_of};
use super::transaction::{SettlementCode, Transaction};

/// Trades reconstructed for one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolTrades {
    pub trades: Vec<Trade>,
    pub duplicates: usize,
    /// Final signed position after the last fill.
    pub position: i64,
}

#[derive(Debug, Clone)]
struct OpenTrade {
    symbol: String,
    side: Side,
    instrument: Instrument,
    opened_at: DateTime<Utc>,
    executions: Vec<Transaction>,
    new_executions: usize,
    entry_value: f64,
    exit_value: f64,
    total_quantity: u64,
    fees: f64,
    origin: TradeOrigin,
}

impl OpenTrade {
    fn open(symbol: &str, fill: &Transaction, instrument: &Instrument) -> Self {
        OpenTrade {
            symbol: symbol.to_string(),
            side: Side::opened_by(fill.action),
            instrument: instrument.clone(),
            opened_at: fill.timestamp,
            executions: Vec::new(),
            new_executions: 0,
            entry_value: 0.0,
            exit_value: 0.0,
            total_quantity: 0,
            fees: 0.0,
            origin: TradeOrigin::New,
        }
    }

    /// Rebuilds the running values from the seed's executions so earlier
    /// partial exits keep their realized value. A seed without executions,
    /// or whose executions do not net to its quantity, falls back to its
    /// average entry price.
    fn from_seed(seed: &SeedPosition, instrument: &Instrument) -> Self {
        let mut trade = OpenTrade {
            symbol: seed.symbol.clone(),
            side: seed.side,
            instrument: instrument.clone(),
            opened_at: seed.entry_time,
            executions: seed.executions.clone(),
            new_executions: 0,
            entry_value: 0.0,
            exit_value: 0.0,
            total_quantity: 0,
            fees: 0.0,
            origin: TradeOrigin::Update {
                trade_id: seed.trade_id.clone(),
            },
        };

        let mut net: i64 = 0;
        for execution in &seed.executions {
            trade.route(execution);
            trade.fees += execution.fees;
            net += execution.signed_quantity();
        }
        let expected = seed.side.sign() * seed.quantity as i64;
        if seed.executions.is_empty() || net != expected {
            if !seed.executions.is_empty() {
                warn!(
                    symbol = %seed.symbol,
                    trade_id = %seed.trade_id,
                    executions_net = net,
                    quantity = seed.quantity,
                    "seed executions do not match its quantity; using average entry price"
                );
            }
            trade.entry_value = seed.quantity as f64 * seed.entry_price * instrument.multiplier;
            trade.exit_value = 0.0;
            trade.total_quantity = seed.quantity;
            trade.fees = seed.fees;
        }
        trade
    }

    fn route(&mut self, fill: &Transaction) {
        let notional = fill.notional(self.instrument.multiplier);
        if fill.action == self.side.entry_action() {
            self.entry_value += notional;
            self.total_quantity += fill.quantity;
        } else {
            self.exit_value += notional;
        }
    }

    fn apply(&mut self, fill: Transaction) {
        self.route(&fill);
        self.fees += fill.fees;
        self.executions.push(fill);
        self.new_executions += 1;
    }

    fn scale(&self) -> f64 {
        self.total_quantity as f64 * self.instrument.multiplier
    }

    fn entry_price(&self) -> f64 {
        let scale = self.scale();
        if scale > 0.0 { self.entry_value / scale } else { 0.0 }
    }

    fn time_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let mut first = self.opened_at;
        let mut last = self.opened_at;
        for execution in &self.executions {
            first = first.min(execution.timestamp);
            last = last.max(execution.timestamp);
        }
        (first, last)
    }

    fn close(self) -> Option<Trade> {
        if self.executions.is_empty() || self.new_executions == 0 {
            return None;
        }
        let scale = self.scale();
        let exit_price = if scale > 0.0 {
            self.exit_value / scale
        } else {
            0.0
        };
        let pnl = match self.side {
            Side::Long => self.exit_value - self.entry_value - self.fees,
            Side::Short => self.entry_value - self.exit_value - self.fees,
        };
        let (entry_time, exit_time) = self.time_bounds();
        Some(Trade {
            entry_price: self.entry_price(),
            symbol: self.symbol,
            side: self.side,
            entry_time,
            exit_time: Some(exit_time),
            exit_price: Some(exit_price),
            quantity: self.total_quantity,
            entry_value: self.entry_value,
            exit_value: self.exit_value,
            fees: self.fees,
            pnl: Some(pnl),
            pnl_percent: Some(percent_of(pnl, self.entry_value)),
            executions: self.executions,
            instrument: self.instrument,
            group_count: 1,
            origin: self.origin,
        })
    }

    fn into_open(self, position: i64) -> Option<Trade> {
        if self.new_executions == 0 {
            return None;
        }
        let (entry_time, _) = self.time_bounds();
        Some(Trade {
            entry_price: self.entry_price(),
            symbol: self.symbol,
            side: self.side,
            entry_time,
            exit_time: None,
            exit_price: None,
            quantity: position.unsigned_abs(),
            entry_value: self.entry_value,
            exit_value: self.exit_value,
            fees: self.fees,
            pnl: None,
            pnl_percent: None,
            executions: self.executions,
            instrument: self.instrument,
            group_count: 1,
            origin: self.origin,
        })
    }
}

/// Instrument for a symbol: seed economics first, then column-supplied, then classification.
pub fn resolve_instrument(
    symbol: &str,
    transactions: &[Transaction],
    seed: Option<&SeedPosition>,
    reference_year: i32,
) -> Instrument {
    seed.and_then(|s| s.instrument.clone())
        .or_else(|| transactions.iter().find_map(|t| t.instrument.clone()))
        .unwrap_or_else(|| classify_as_of(symbol, reference_year))
}

/// Replays one symbol's fills, in timestamp order, into closed and open trades.
pub fn build_trades(
    symbol: &str,
    transactions: &[Transaction],
    seed: Option<&SeedPosition>,
    history: &ExecutionHistory,
    reference_year: i32,
) -> SymbolTrades {
    let instrument = resolve_instrument(symbol, transactions, seed, reference_year);
    let mut out = SymbolTrades::default();
    let mut position: i64 = 0;
    let mut current: Option<OpenTrade> = None;

    if let Some(seed) = seed.filter(|s| s.quantity > 0) {
        position = seed.side.sign() * seed.quantity as i64;
        current = Some(OpenTrade::from_seed(seed, &instrument));
    }

    for tx in transactions {
        if is_duplicate(tx, symbol, history) {
            debug!(symbol, fill_id = ?tx.broker_fill_id, "skipping previously recorded execution");
            out.duplicates += 1;
            continue;
        }
        if position == 0 && tx.settlement == Some(SettlementCode::Close) {
            warn!(symbol, timestamp = %tx.timestamp, "closing fill with no open position; treating as an opening fill");
        }

        let mut pending = Some(tx.clone());
        while let Some(fill) = pending.take() {
            let trade = current.get_or_insert_with(|| OpenTrade::open(symbol, &fill, &instrument));
            let after = position + fill.signed_quantity();

            let leg = if position != 0 && after != 0 && after.signum() != position.signum() {
                let (closing, reopening) = fill.split(position.unsigned_abs());
                debug!(symbol, closing = closing.quantity, reopening = reopening.quantity, "splitting fill at zero crossing");
                pending = Some(reopening);
                closing
            } else {
                fill
            };

            position += leg.signed_quantity();
            trade.apply(leg);

            if position == 0 {
                if let Some(closed) = current.take().and_then(OpenTrade::close) {
                    out.trades.push(closed);
                }
            }
        }
    }

    if let Some(open) = current.take() {
        if let Some(trade) = open.into_open(position) {
            out.trades.push(trade);
        }
    }
    out.position = position;
    out
}
