//! Interactive Brokers activity statements and trade confirmation reports.

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::{
    Instrument, InstrumentType, OptionType, classify_as_of, readable_option_symbol,
};
use crate::domain::transaction::{Action, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, optional_number, parse_day, parse_timestamp,
    read_records, required_number, required_text, sum_fees, table_after_header, to_quantity,
};
use super::generic::side_from_text;

const PRICE: &[&str] = &["t. price", "tradeprice", "price"];
const DATE_TIME: &[&str] = &["date/time", "datetime", "tradedatetime"];
const TRADE_DISCRIMINATORS: &[&str] = &["order", "trade", "execution"];

/// True for rows of a full statement's `Trades` section (`Trades,Header,...`).
fn is_section_row(row: &[String], kind: &str) -> bool {
    row.first().is_some_and(|c| c.eq_ignore_ascii_case("trades"))
        && row.get(1).is_some_and(|c| c.eq_ignore_ascii_case(kind))
}

fn is_activity_header(header: &HeaderIndex) -> bool {
    header.has_any(DATE_TIME) && header.has_any(PRICE) && header.has("symbol")
}

pub fn parse_activity(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;

    let embedded = records.iter().any(|r| is_section_row(r, "header"));
    if !embedded {
        let table = table_after_header(records, "ibkr", is_activity_header)?;
        return Ok(table
            .rows
            .iter()
            .map(|row| parse_activity_row(&table.header, row, opts))
            .collect());
    }

    // Full statements repeat the Trades header per asset class.
    let mut header: Option<HeaderIndex> = None;
    let mut outcomes = Vec::new();
    for row in &records {
        if is_section_row(row, "header") {
            let candidate = HeaderIndex::new(row);
            header = is_activity_header(&candidate).then_some(candidate);
        } else if row.first().is_some_and(|c| c.eq_ignore_ascii_case("trades")) {
            let outcome = match (&header, is_section_row(row, "data")) {
                (Some(h), true) => parse_activity_row(h, row, opts),
                _ => RowOutcome::Skip(SkipReason::NotATrade),
            };
            outcomes.push(outcome);
        }
    }
    if header.is_none() && outcomes.is_empty() {
        return Err(ImportError::MissingHeader {
            format: "ibkr".into(),
        });
    }
    Ok(outcomes)
}

pub fn parse_activity_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_activity(header, row, opts).into()
}

fn map_activity(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let discriminator = header.get(row, &["datadiscriminator"]);
    if discriminator.is_some_and(|kind| !TRADE_DISCRIMINATORS.iter().any(|d| kind.eq_ignore_ascii_case(d))) {
        return Err(SkipReason::NotATrade);
    }
    if header
        .get(row, &["asset category", "assetclass"])
        .is_some_and(|c| c.eq_ignore_ascii_case("forex") || c.eq_ignore_ascii_case("cash"))
    {
        return Err(SkipReason::NotATrade);
    }

    let symbol = required_text(header, row, &["symbol"], "symbol")?.to_uppercase();
    // Quantities are signed; option quantities are already contracts.
    let signed_qty = required_number(header, row, &["quantity"], "quantity")?;
    let action = Action::from_signed(signed_qty).ok_or(SkipReason::ZeroQuantity)?;
    let quantity = to_quantity(signed_qty)?;
    let price = required_number(header, row, PRICE, "price")?;

    let when = required_text(header, row, DATE_TIME, "date/time")?;
    let timestamp =
        parse_timestamp(when, opts).ok_or_else(|| SkipReason::InvalidDate(when.to_string()))?;

    let currency = header.get(row, &["currency"]).map(str::to_string);
    let mut tx = Transaction::new(symbol, action, quantity, price, timestamp)
        .with_fees(sum_fees(header, row, &["comm/fee", "commission"])?)
        .with_currency(currency);
    if let Some(id) = header.get(row, &["tradeid", "trade id", "execid"]) {
        tx = tx.with_fill_id(id);
    }
    Ok(RowOutcome::Fill(tx))
}

pub fn parse_confirmation(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "ibkr_trade_confirmation", |h| {
        h.has("underlyingsymbol") && h.has("buy/sell")
    })?;
    Ok(table
        .rows
        .iter()
        .map(|row| parse_confirmation_row(&table.header, row, opts))
        .collect())
}

pub fn parse_confirmation_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_confirmation(header, row, opts).into()
}

/// Option economics from the dedicated contract columns, with the readable symbol.
fn confirmation_option(
    header: &HeaderIndex,
    row: &[String],
    reference_year: i32,
) -> Option<(String, Instrument)> {
    let option_type = OptionType::parse(header.get(row, &["put/call"])?)?;
    let underlying = header.get(row, &["underlyingsymbol"])?.to_uppercase();
    let expiration = parse_day(header.get(row, &["expiry", "expiration"])?, reference_year)?;
    let strike: f64 = header.get(row, &["strike"])?.parse().ok()?;
    Some((
        readable_option_symbol(&underlying, expiration, strike, option_type),
        Instrument::option(&underlying, expiration, strike, option_type),
    ))
}

fn map_confirmation(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let raw_symbol = required_text(header, row, &["symbol"], "symbol")?;
    let signed_qty = required_number(header, row, &["quantity"], "quantity")?;
    let action = match header.get(row, &["buy/sell"]) {
        Some(text) => {
            side_from_text(text).ok_or_else(|| SkipReason::UnknownSide(text.to_string()))?
        }
        None => Action::from_signed(signed_qty).ok_or(SkipReason::ZeroQuantity)?,
    };
    let quantity = to_quantity(signed_qty)?;
    let price = required_number(header, row, &["price", "tradeprice"], "price")?;

    let when = required_text(header, row, &["date/time", "datetime"], "date/time")?;
    let timestamp =
        parse_timestamp(when, opts).ok_or_else(|| SkipReason::InvalidDate(when.to_string()))?;

    let multiplier = optional_number(header, row, &["multiplier"], "multiplier")?.filter(|m| *m > 0.0);
    let (symbol, instrument) = match confirmation_option(header, row, opts.reference_year) {
        Some((symbol, mut option)) => {
            if let Some(m) = multiplier {
                option.multiplier = m;
            }
            (symbol, option)
        }
        None => {
            let symbol = raw_symbol.to_uppercase();
            let mut instrument = classify_as_of(&symbol, opts.reference_year);
            if instrument.instrument_type == InstrumentType::Future {
                instrument.multiplier = multiplier.unwrap_or(instrument.multiplier);
            }
            (symbol, instrument)
        }
    };

    let currency = header
        .get(row, &["currencyprimary", "currency"])
        .map(str::to_string);
    let mut tx = Transaction::new(symbol, action, quantity, price, timestamp)
        .with_fees(sum_fees(header, row, &["commission", "ibcommission"])?)
        .with_currency(currency)
        .with_instrument(instrument);
    if let Some(id) = header.get(row, &["tradeid", "ibexecid"]) {
        tx = tx.with_fill_id(id);
    }
    Ok(RowOutcome::Fill(tx))
}
