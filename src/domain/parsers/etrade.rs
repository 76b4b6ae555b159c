//! E*TRADE transaction downloads.

use regex::Regex;
use std::sync::LazyLock;

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::{OptionType, month_from_abbrev, readable_option_symbol};
use crate::domain::transaction::{Action, SettlementCode, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, expand_two_digit_year, parse_date_time, read_records,
    required_number, required_text, sum_fees, table_after_header, to_quantity,
};

/// `AAPL Jan 19 '24 $150 Call`
static ETRADE_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z./]*)\s+([A-Z]{3})\s+(\d{1,2})\s+'(\d{2})\s+\$(\d+(?:\.\d+)?)\s+(CALL|PUT)$")
        .expect("valid regex")
});

const DATE: &[&str] = &["transactiondate", "transaction date"];
const TYPE: &[&str] = &["transactiontype", "transaction type"];

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "etrade", |h| h.has_any(DATE) && h.has_any(TYPE))?;
    Ok(table
        .rows
        .iter()
        .map(|row| parse_row(&table.header, row, opts))
        .collect())
}

pub fn parse_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_row(header, row, opts).into()
}

pub fn classify_transaction_type(kind: &str) -> Option<(Action, Option<SettlementCode>)> {
    let resolved = match kind.trim().to_lowercase().as_str() {
        "bought" => (Action::Buy, None),
        "bought to open" => (Action::Buy, Some(SettlementCode::Open)),
        "bought to cover" | "bought to close" => (Action::Buy, Some(SettlementCode::Close)),
        "sold" => (Action::Sell, None),
        "sold short" | "sold to open" => (Action::Sell, Some(SettlementCode::Open)),
        "sold to close" => (Action::Sell, Some(SettlementCode::Close)),
        _ => return None,
    };
    Some(resolved)
}

pub fn normalize_symbol(raw: &str, reference_year: i32) -> String {
    let upper = raw.trim().to_uppercase();
    let Some(caps) = ETRADE_OPTION.captures(&upper) else {
        return upper;
    };
    let expiration = month_from_abbrev(&caps[2]).and_then(|month| {
        let day: u32 = caps[3].parse().ok()?;
        let year = expand_two_digit_year(caps[4].parse().ok()?, reference_year);
        chrono::NaiveDate::from_ymd_opt(year, month, day)
    });
    match (expiration, caps[5].parse::<f64>().ok(), OptionType::parse(&caps[6])) {
        (Some(expiration), Some(strike), Some(option_type)) => {
            readable_option_symbol(&caps[1], expiration, strike, option_type)
        }
        _ => upper,
    }
}

fn map_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let kind = required_text(header, row, TYPE, "transaction type")?;
    let (action, settlement) = classify_transaction_type(kind).ok_or(SkipReason::NotATrade)?;

    let symbol = normalize_symbol(
        required_text(header, row, &["symbol"], "symbol")?,
        opts.reference_year,
    );
    let quantity = to_quantity(required_number(header, row, &["quantity"], "quantity")?)?;
    let price = required_number(header, row, &["price"], "price")?;

    let date = required_text(header, row, DATE, "transaction date")?;
    let timestamp =
        parse_date_time(date, None, opts).ok_or_else(|| SkipReason::InvalidDate(date.to_string()))?;

    Ok(RowOutcome::Fill(
        Transaction::new(symbol, action, quantity, price.abs(), timestamp)
            .with_fees(sum_fees(header, row, &["commission", "fees"])?)
            .with_settlement(settlement),
    ))
}
