//! Lightspeed execution reports.

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::transaction::{Action, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, parse_date_time, read_records, required_number,
    required_text, sum_fees, table_after_header, to_quantity,
};
use super::generic::side_from_text;

const FEE_COLUMNS: &[&str] = &[
    "commission amount",
    "sec fee",
    "finra taf",
    "ecn fee",
    "nscc fee",
    "clearing fee",
    "cat fee",
    "misc fee",
    "exchange fee",
    "other fees",
];

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "lightspeed", |h| {
        h.has("trade number") && h.has("symbol")
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

/// Side from a short B/S code such as `B`, `S`, `SS` or `BC`.
fn side_from_code(code: &str) -> Option<Action> {
    match code.trim().to_uppercase().as_str() {
        "B" | "BC" | "BUY" => Some(Action::Buy),
        "S" | "SS" | "SHORT" | "SELL" => Some(Action::Sell),
        _ => None,
    }
}

fn resolve_side(
    code: Option<&str>,
    signed_qty: f64,
    text: Option<&str>,
) -> Result<Action, SkipReason> {
    if let Some(action) = code.and_then(side_from_code) {
        return Ok(action);
    }
    if signed_qty < 0.0 {
        return Ok(Action::Sell);
    }
    if let Some(text) = text {
        return side_from_text(text).ok_or_else(|| SkipReason::UnknownSide(text.to_string()));
    }
    match code {
        Some(code) => Err(SkipReason::UnknownSide(code.to_string())),
        None => Ok(Action::Buy),
    }
}

fn map_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let symbol = required_text(header, row, &["symbol"], "symbol")?;
    let signed_qty = required_number(header, row, &["qty", "quantity"], "quantity")?;
    let price = required_number(header, row, &["price", "execution price"], "price")?;
    let action = resolve_side(
        header.get(row, &["side"]),
        signed_qty,
        header.get(row, &["buy/sell"]),
    )?;
    let quantity = to_quantity(signed_qty)?;

    let date = required_text(header, row, &["trade date", "date"], "trade date")?;
    let time = header.get(row, &["execution time", "time"]);
    let timestamp = parse_date_time(date, time, opts)
        .ok_or_else(|| SkipReason::InvalidDate(date.to_string()))?;

    let mut tx = Transaction::new(symbol.to_uppercase(), action, quantity, price, timestamp)
        .with_fees(sum_fees(header, row, FEE_COLUMNS)?);
    if let Some(id) = header.get(row, &["trade number"]) {
        tx = tx.with_fill_id(id);
    }
    Ok(RowOutcome::Fill(tx))
}
