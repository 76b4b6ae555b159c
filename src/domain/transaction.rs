//! Canonical broker fill produced by the row parsers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instrument::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    /// Signed position change for `quantity` units.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            Action::Buy => quantity,
            Action::Sell => -quantity,
        }
    }

    pub fn opposite(&self) -> Action {
        match self {
            Action::Buy => Action::Sell,
            Action::Sell => Action::Buy,
        }
    }

    pub fn from_signed(quantity: f64) -> Option<Action> {
        if quantity > 0.0 {
            Some(Action::Buy)
        } else if quantity < 0.0 {
            Some(Action::Sell)
        } else {
            None
        }
    }
}

/// Broker hint on whether a fill opens or closes a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementCode {
    Open,
    Partial,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub symbol: String,
    pub action: Action,
    /// Always a positive magnitude; contracts for options and futures.
    pub quantity: u64,
    pub price: f64,
    pub fees: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_fill_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementCode>,
    /// ISO currency of `price` and `fees` when the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Economics supplied by dedicated columns, overriding symbol classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
    /// Quantity of the raw fill when this execution is one leg of a split fill.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_of: Option<u64>,
}

impl Transaction {
    pub fn new(
        symbol: impl Into<String>,
        action: Action,
        quantity: u64,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Transaction {
            symbol: symbol.into(),
            action,
            quantity,
            price,
            fees: 0.0,
            timestamp,
            broker_fill_id: None,
            settlement: None,
            currency: None,
            instrument: None,
            split_of: None,
        }
    }

    pub fn with_fees(mut self, fees: f64) -> Self {
        self.fees = fees.abs();
        self
    }

    pub fn with_fill_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.broker_fill_id = Some(id.trim().to_string());
        }
        self
    }

    pub fn with_settlement(mut self, code: Option<SettlementCode>) -> Self {
        self.settlement = code;
        self
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty());
        self
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instrument = Some(instrument);
        self
    }

    pub fn signed_quantity(&self) -> i64 {
        self.action.signed(self.quantity as i64)
    }

    /// Quantity the broker originally reported for this fill.
    pub fn reported_quantity(&self) -> u64 {
        self.split_of.unwrap_or(self.quantity)
    }

    pub fn notional(&self, multiplier: f64) -> f64 {
        self.quantity as f64 * self.price * multiplier
    }

    /// Splits off `quantity` units; the returned pair is (taken, remainder).
    ///
    /// Fees are apportioned by quantity and both legs remember the raw size.
    pub fn split(&self, quantity: u64) -> (Transaction, Transaction) {
        let taken_share = quantity as f64 / self.quantity as f64;
        let mut taken = self.clone();
        taken.quantity = quantity;
        taken.fees = self.fees * taken_share;
        taken.split_of = Some(self.reported_quantity());

        let mut rest = self.clone();
        rest.quantity = self.quantity - quantity;
        rest.fees = self.fees - taken.fees;
        rest.split_of = Some(self.reported_quantity());
        (taken, rest)
    }
}
