//! Reconstructed trades and the seed positions that extend them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instrument::Instrument;
use super::transaction::{Action, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opened_by(action: Action) -> Side {
        match action {
            Action::Buy => Side::Long,
            Action::Sell => Side::Short,
        }
    }

    /// The action that adds to a position on this side.
    pub fn entry_action(&self) -> Action {
        match self {
            Side::Long => Action::Buy,
            Side::Short => Action::Sell,
        }
    }

    pub fn sign(&self) -> i64 {
        match self {
            Side::Long => 1,
            Side::Short => -1,
        }
    }
}

/// Whether a trade is a new record or extends one the caller already holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeOrigin {
    New,
    Update { trade_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    /// Net open size while open; gross matched size once closed.
    pub quantity: u64,
    pub entry_value: f64,
    pub exit_value: f64,
    pub fees: f64,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub executions: Vec<Transaction>,
    pub instrument: Instrument,
    pub group_count: u32,
    pub origin: TradeOrigin,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_price.is_none()
    }

    pub fn is_update(&self) -> bool {
        matches!(self.origin, TradeOrigin::Update { .. })
    }

    /// Builds an already-closed trade for formats that export round trips.
    #[allow(clippy::too_many_arguments)]
    pub fn round_trip(
        symbol: &str,
        side: Side,
        quantity: u64,
        entry_price: f64,
        exit_price: f64,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        fees: f64,
        instrument: Instrument,
    ) -> Trade {
        let scale = quantity as f64 * instrument.multiplier;
        let entry_value = entry_price * scale;
        let exit_value = exit_price * scale;
        let pnl = match side {
            Side::Long => exit_value - entry_value - fees,
            Side::Short => entry_value - exit_value - fees,
        };
        Trade {
            symbol: symbol.to_string(),
            side,
            entry_time,
            exit_time: Some(exit_time),
            entry_price,
            exit_price: Some(exit_price),
            quantity,
            entry_value,
            exit_value,
            fees,
            pnl: Some(pnl),
            pnl_percent: Some(percent_of(pnl, entry_value)),
            executions: Vec::new(),
            instrument,
            group_count: 1,
            origin: TradeOrigin::New,
        }
    }
}

pub fn percent_of(pnl: f64, entry_value: f64) -> f64 {
    if entry_value.abs() < f64::EPSILON {
        0.0
    } else {
        pnl / entry_value * 100.0
    }
}

/// An open position the caller already holds, fed back from a previous import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPosition {
    pub trade_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    #[serde(default)]
    pub fees: f64,
    #[serde(default)]
    pub executions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
}

impl SeedPosition {
    /// Re-seeds an open trade from a previous import's output.
    pub fn from_open_trade(trade_id: impl Into<String>, trade: &Trade) -> Option<SeedPosition> {
        if !trade.is_open() {
            return None;
        }
        Some(SeedPosition {
            trade_id: trade_id.into(),
            symbol: trade.symbol.clone(),
            side: trade.side,
            quantity: trade.quantity,
            entry_price: trade.entry_price,
            entry_time: trade.entry_time,
            fees: trade.fees,
            executions: trade.executions.clone(),
            instrument: Some(trade.instrument.clone()),
        })
    }
}
