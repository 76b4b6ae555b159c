//! TradingView order history exports.

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::transaction::Transaction;

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, optional_number, parse_timestamp, read_records,
    required_number, required_text, table_after_header, to_quantity,
};
use super::generic::side_from_text;

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "tradingview", |h| {
        h.has("fill price") && h.has("status")
    })?;
    Ok(table
        .rows
        .iter()
        .map(|row| parse_row(&table.header, row, opts))
        .collect())
}

pub fn parse_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_row(header, row, opts).into()
}

/// `NASDAQ:AAPL` becomes `AAPL`; continuous futures like `CME_MINI:ES1!` stay whole.
pub fn strip_exchange(symbol: &str) -> String {
    let symbol = symbol.trim().to_uppercase();
    if symbol.ends_with('!') {
        return symbol;
    }
    match symbol.split_once(':') {
        Some((_, ticker)) => ticker.to_string(),
        None => symbol,
    }
}

fn map_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let status = header.get(row, &["status"]).unwrap_or_default();
    if !status.eq_ignore_ascii_case("filled") {
        return Err(SkipReason::Unfilled);
    }

    let symbol = strip_exchange(required_text(header, row, &["symbol"], "symbol")?);
    let side = required_text(header, row, &["side"], "side")?;
    let action = side_from_text(side).ok_or_else(|| SkipReason::UnknownSide(side.to_string()))?;
    let quantity = to_quantity(required_number(header, row, &["qty", "quantity"], "quantity")?)?;
    let price = required_number(header, row, &["fill price"], "fill price")?;

    let when = required_text(header, row, &["closing time", "placing time"], "closing time")?;
    let timestamp =
        parse_timestamp(when, opts).ok_or_else(|| SkipReason::InvalidDate(when.to_string()))?;
    let fees = optional_number(header, row, &["commission"], "commission")?.unwrap_or(0.0);

    let mut tx = Transaction::new(symbol, action, quantity, price, timestamp).with_fees(fees);
    if let Some(id) = header.get(row, &["order id"]) {
        tx = tx.with_fill_id(id);
    }
    Ok(RowOutcome::Fill(tx))
}
