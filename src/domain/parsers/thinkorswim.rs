//! thinkorswim account statements.
//!
//! Only the cash-balance rows typed `TRD` are executions. Their details live
//! in the free-text description, and partial fills share one `REF #`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::{OptionType, readable_option_symbol};
use crate::domain::transaction::{Action, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, parse_date_time, parse_number, read_records,
    required_text, spelled_expiration, sum_fees, table_after_header, to_quantity,
};

static TRADE_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(BOT|SOLD)\s+([+-]?[\d,]+)\s+(.+?)\s+@\s*([\d.,]+)").expect("valid regex")
});

static SPELLED_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([A-Z][A-Z./]*)\s+(?:\d+\s+)?(?:\([^)]*\)\s+)*(\d{1,2}\s+[A-Z]{3}\s+\d{2,4})\s+(\d+(?:\.\d+)?)\s+(CALL|PUT)$",
    )
    .expect("valid regex")
});

const FEE_COLUMNS: &[&str] = &["misc fees", "commissions & fees"];

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "thinkorswim", |h| {
        h.has("ref #") && h.has("description")
    })?;

    let mut outcomes: Vec<RowOutcome> = Vec::with_capacity(table.rows.len());
    let mut by_reference: HashMap<(String, String, Action), usize> = HashMap::new();
    for row in &table.rows {
        let tx = match parse_row(&table.header, row, opts) {
            RowOutcome::Fill(tx) => tx,
            other => {
                outcomes.push(other);
                continue;
            }
        };
        let Some(reference) = tx.broker_fill_id.clone() else {
            outcomes.push(RowOutcome::Fill(tx));
            continue;
        };
        let key = (reference, tx.symbol.clone(), tx.action);
        match by_reference.get(&key) {
            Some(&first) => {
                if let RowOutcome::Fill(earlier) = &mut outcomes[first] {
                    merge_fill(earlier, &tx);
                }
                outcomes.push(RowOutcome::Skip(SkipReason::Merged));
            }
            None => {
                by_reference.insert(key, outcomes.len());
                outcomes.push(RowOutcome::Fill(tx));
            }
        }
    }
    Ok(outcomes)
}

pub fn parse_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_row(header, row, opts).into()
}

/// Folds a partial fill into the first fill sharing its reference number.
fn merge_fill(into: &mut Transaction, part: &Transaction) {
    let total = into.quantity + part.quantity;
    into.price = (into.price * into.quantity as f64 + part.price * part.quantity as f64)
        / total as f64;
    into.quantity = total;
    into.fees += part.fees;
    into.timestamp = into.timestamp.min(part.timestamp);
}

/// Rewrites description symbols into a form the instrument classifier reads.
pub fn normalize_symbol(raw: &str, reference_year: i32) -> String {
    let raw = raw.trim().to_uppercase();
    if let Some(caps) = SPELLED_OPTION.captures(&raw) {
        let parsed = (
            spelled_expiration(&caps[2], reference_year),
            caps[3].parse::<f64>().ok(),
            OptionType::parse(&caps[4]),
        );
        if let (Some(expiration), Some(strike), Some(option_type)) = parsed {
            return readable_option_symbol(&caps[1], expiration, strike, option_type);
        }
    }
    // Futures read `/ESZ24:XCME`.
    if let Some(future) = raw.strip_prefix('/') {
        return future.split(':').next().unwrap_or(future).to_string();
    }
    raw
}

fn map_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let kind = header.get(row, &["type"]).unwrap_or_default();
    if !kind.eq_ignore_ascii_case("TRD") {
        return Err(SkipReason::NotATrade);
    }

    let description = required_text(header, row, &["description"], "description")?;
    let caps = TRADE_DESCRIPTION
        .captures(description)
        .ok_or(SkipReason::MissingField("trade description"))?;
    let action = if &caps[1] == "BOT" { Action::Buy } else { Action::Sell };
    let quantity = parse_number(&caps[2])
        .ok_or_else(|| SkipReason::InvalidNumber {
            field: "quantity",
            value: caps[2].to_string(),
        })
        .and_then(to_quantity)?;
    let price = parse_number(&caps[4]).ok_or_else(|| SkipReason::InvalidNumber {
        field: "price",
        value: caps[4].to_string(),
    })?;
    let symbol = normalize_symbol(&caps[3], opts.reference_year);

    let date = required_text(header, row, &["date"], "date")?;
    let timestamp = parse_date_time(date, header.get(row, &["time"]), opts)
        .ok_or_else(|| SkipReason::InvalidDate(date.to_string()))?;

    let mut tx = Transaction::new(symbol, action, quantity, price, timestamp)
        .with_fees(sum_fees(header, row, FEE_COLUMNS)?);
    if let Some(reference) = header.get(row, &["ref #"]) {
        tx = tx.with_fill_id(reference.trim_start_matches('='));
    }
    Ok(RowOutcome::Fill(tx))
}
