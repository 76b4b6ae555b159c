//! Charles Schwab exports: realized gain/loss reports and transaction ledgers.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::{OptionType, classify_as_of, readable_option_symbol};
use crate::domain::trade::{Side, Trade};
use crate::domain::transaction::{Action, SettlementCode, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, Table, parse_date_time, parse_day, read_records,
    required_number, required_text, sum_fees, table_after_header, to_quantity,
};

static SCHWAB_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z./]*)\s+(\d{2}/\d{2}/\d{4})\s+(\d+(?:\.\d+)?)\s+([CP])$")
        .expect("valid regex")
});

/// Ledger columns in export order, used when the header row is missing.
const POSITIONAL_HEADER: [&str; 8] = [
    "Date",
    "Action",
    "Symbol",
    "Description",
    "Quantity",
    "Price",
    "Fees & Comm",
    "Amount",
];

/// `AAPL 01/19/2024 150.00 C` becomes `AAPL 19JAN24 150 CALL`.
pub fn normalize_symbol(raw: &str, reference_year: i32) -> String {
    let upper = raw.trim().to_uppercase();
    let Some(caps) = SCHWAB_OPTION.captures(&upper) else {
        return upper;
    };
    let parsed = (
        parse_day(&caps[2], reference_year),
        caps[3].parse::<f64>().ok(),
        OptionType::parse(&caps[4]),
    );
    match parsed {
        (Some(expiration), Some(strike), Some(option_type)) => {
            readable_option_symbol(&caps[1], expiration, strike, option_type)
        }
        _ => upper,
    }
}

pub fn parse_gain_loss(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "schwab", |h| {
        h.has("cost per share") && h.has("proceeds per share")
    })?;
    Ok(table
        .rows
        .iter()
        .map(|row| parse_gain_loss_row(&table.header, row, opts))
        .collect())
}

pub fn parse_gain_loss_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_gain_loss(header, row, opts).into()
}

fn map_gain_loss(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let raw_symbol = required_text(header, row, &["symbol"], "symbol")?;
    if raw_symbol.to_lowercase().starts_with("total") {
        return Err(SkipReason::NotATrade);
    }
    let symbol = normalize_symbol(raw_symbol, opts.reference_year);

    let signed_qty = required_number(header, row, &["quantity"], "quantity")?;
    let quantity = to_quantity(signed_qty)?;
    let cost = required_number(header, row, &["cost per share"], "cost per share")?;
    let proceeds = required_number(header, row, &["proceeds per share"], "proceeds per share")?;

    let opened = required_text(header, row, &["opened date"], "opened date")?;
    let closed = required_text(header, row, &["closed date"], "closed date")?;
    let opened_at =
        parse_date_time(opened, None, opts).ok_or_else(|| SkipReason::InvalidDate(opened.to_string()))?;
    let closed_at =
        parse_date_time(closed, None, opts).ok_or_else(|| SkipReason::InvalidDate(closed.to_string()))?;

    // Short sales report a negative quantity; they open on the sale.
    let (side, entry_price, exit_price) = if signed_qty < 0.0 {
        (Side::Short, proceeds, cost)
    } else {
        (Side::Long, cost, proceeds)
    };
    let (entry_time, exit_time) = (opened_at.min(closed_at), opened_at.max(closed_at));

    let instrument = classify_as_of(&symbol, opts.reference_year);
    let mut trade = Trade::round_trip(
        &symbol, side, quantity, entry_price, exit_price, entry_time, exit_time, 0.0, instrument,
    );
    trade.executions = vec![
        Transaction::new(&symbol, side.entry_action(), quantity, entry_price, entry_time),
        Transaction::new(&symbol, side.entry_action().opposite(), quantity, exit_price, exit_time),
    ];
    Ok(RowOutcome::RoundTrip(trade))
}

/// Tab-separated when the first line has more tabs than commas.
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    if first.matches('\t').count() > first.matches(',').count() {
        b'\t'
    } else {
        b','
    }
}

pub fn parse_transactions(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, sniff_delimiter(text))?;
    let has_header = records.iter().any(|r| {
        let header = HeaderIndex::new(r);
        header.has("action") && header.has("fees & comm")
    });
    let table = if has_header {
        table_after_header(records, "schwab_transactions", |h| {
            h.has("action") && h.has("fees & comm")
        })?
    } else {
        Table {
            header: HeaderIndex::new(&POSITIONAL_HEADER),
            rows: records,
        }
    };
    Ok(table
        .rows
        .iter()
        .map(|row| parse_transaction_row(&table.header, row, opts))
        .collect())
}

pub fn parse_transaction_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_transaction(header, row, opts).into()
}

/// Ledger action text to a side and an open/close hint. Anything else is not a trade.
pub fn classify_action(action: &str) -> Option<(Action, Option<SettlementCode>)> {
    let resolved = match action.trim().to_lowercase().as_str() {
        "buy" => (Action::Buy, None),
        "buy to open" => (Action::Buy, Some(SettlementCode::Open)),
        "buy to close" | "buy to cover" => (Action::Buy, Some(SettlementCode::Close)),
        "sell" => (Action::Sell, None),
        "sell short" | "sell to open" => (Action::Sell, Some(SettlementCode::Open)),
        "sell to close" => (Action::Sell, Some(SettlementCode::Close)),
        _ => return None,
    };
    Some(resolved)
}

fn map_transaction(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let action_text = required_text(header, row, &["action"], "action")?;
    let (action, settlement) = classify_action(action_text).ok_or(SkipReason::NotATrade)?;

    let symbol = normalize_symbol(
        required_text(header, row, &["symbol"], "symbol")?,
        opts.reference_year,
    );
    let quantity = to_quantity(required_number(header, row, &["quantity"], "quantity")?)?;
    let price = required_number(header, row, &["price"], "price")?;

    let date = required_text(header, row, &["date"], "date")?;
    let timestamp =
        parse_date_time(date, None, opts).ok_or_else(|| SkipReason::InvalidDate(date.to_string()))?;

    Ok(RowOutcome::Fill(
        Transaction::new(symbol, action, quantity, price.abs(), timestamp)
            .with_fees(sum_fees(header, row, &["fees & comm"])?)
            .with_settlement(settlement),
    ))
}
