#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use tradeimport::domain::error::ImportError;
use tradeimport::domain::import::{ImportContext, ImportOutcome, import_file};
use tradeimport::domain::trade::{SeedPosition, Side, Trade};
use tradeimport::domain::transaction::{Action, Transaction};
use tradeimport::ports::currency_port::CurrencyPort;
use tradeimport::ports::identifier_port::IdentifierPort;

/// Identifier resolver backed by a fixed table, recording every request.
#[derive(Default)]
pub struct MockIdentifierPort {
    pub table: HashMap<String, String>,
    pub failure: Option<String>,
    pub calls: RefCell<Vec<Vec<String>>>,
}

impl MockIdentifierPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticker(mut self, code: &str, ticker: &str) -> Self {
        self.table.insert(code.to_string(), ticker.to_string());
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }
}

impl IdentifierPort for MockIdentifierPort {
    fn resolve(
        &self,
        codes: &[String],
        _user_id: Option<&str>,
    ) -> Result<HashMap<String, String>, ImportError> {
        self.calls.borrow_mut().push(codes.to_vec());
        if let Some(reason) = &self.failure {
            return Err(ImportError::IdentifierResolution {
                reason: reason.clone(),
            });
        }
        Ok(codes
            .iter()
            .filter_map(|c| self.table.get(c).map(|t| (c.clone(), t.clone())))
            .collect())
    }
}

/// Currency rates backed by a fixed table, recording every lookup.
#[derive(Default)]
pub struct MockCurrencyPort {
    pub rates: HashMap<String, f64>,
    pub calls: RefCell<Vec<(String, NaiveDate)>>,
}

impl MockCurrencyPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, currency: &str, rate: f64) -> Self {
        self.rates.insert(currency.to_string(), rate);
        self
    }
}

impl CurrencyPort for MockCurrencyPort {
    fn usd_rate(&self, currency: &str, as_of: NaiveDate) -> Result<f64, ImportError> {
        self.calls.borrow_mut().push((currency.to_string(), as_of));
        self.rates
            .get(currency)
            .copied()
            .ok_or_else(|| ImportError::CurrencyConversion {
                currency: currency.to_string(),
                reason: "no rate".to_string(),
            })
    }
}

pub fn ctx() -> ImportContext {
    ImportContext {
        reference_year: 2025,
        ..Default::default()
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
}

pub fn at(minute: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minute)
}

pub fn fill(symbol: &str, action: Action, qty: u64, price: f64, minute: i64) -> Transaction {
    Transaction::new(symbol, action, qty, price, at(minute))
}

pub fn seed(trade_id: &str, symbol: &str, side: Side, qty: u64, price: f64) -> SeedPosition {
    let opening = fill(symbol, side.entry_action(), qty, price, -24 * 60);
    SeedPosition {
        trade_id: trade_id.to_string(),
        symbol: symbol.to_string(),
        side,
        quantity: qty,
        entry_price: price,
        entry_time: opening.timestamp,
        fees: 0.0,
        executions: vec![opening],
        instrument: None,
    }
}

/// Generic-format CSV text with one row per fill.
pub fn generic_csv(fills: &[Transaction]) -> String {
    let mut csv = String::from("Symbol,Side,Quantity,Price,Date,Fees,Trade ID\n");
    for f in fills {
        let side = match f.action {
            Action::Buy => "Buy",
            Action::Sell => "Sell",
        };
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            f.symbol,
            side,
            f.quantity,
            f.price,
            f.timestamp.format("%Y-%m-%d %H:%M:%S"),
            f.fees,
            f.broker_fill_id.as_deref().unwrap_or(""),
        ));
    }
    csv
}

pub fn import(text: &str, ctx: &ImportContext) -> ImportOutcome {
    import_file(
        text.as_bytes(),
        ctx,
        &MockIdentifierPort::new(),
        &MockCurrencyPort::new(),
    )
    .unwrap()
}

pub fn closed(trades: &[Trade]) -> Vec<&Trade> {
    trades.iter().filter(|t| !t.is_open()).collect()
}
