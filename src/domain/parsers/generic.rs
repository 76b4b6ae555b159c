//! Generic and custom-mapped CSV layouts.

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::transaction::{Action, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, parse_date_time, read_records,
    required_number, required_text, sum_fees, table_after_header, to_quantity,
};

const SYMBOL: &[&str] = &["symbol", "ticker", "instrument", "contract"];
const SIDE: &[&str] = &["side", "action", "buy/sell", "b/s", "direction"];
const QUANTITY: &[&str] = &["quantity", "qty", "shares", "size", "filled qty"];
const PRICE: &[&str] = &["price", "fill price", "avg price", "execution price", "avg fill price"];
const DATE: &[&str] = &["datetime", "date/time", "timestamp", "date", "trade date", "time"];
const TIME: &[&str] = &["time", "execution time", "exec time"];
const FEES: &[&str] = &["fees", "fee", "commission", "commissions"];
const FILL_ID: &[&str] = &["trade id", "execution id", "exec id", "fill id", "order id", "id"];
const CURRENCY: &[&str] = &["currency"];

/// User-supplied column names for the generic parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub fees: Option<String>,
    pub commission: Option<String>,
    pub fill_id: Option<String>,
    pub currency: Option<String>,
}

/// Column names resolved from a mapping with alias fallbacks.
struct Columns<'a> {
    symbol: Vec<&'a str>,
    side: Option<Vec<&'a str>>,
    quantity: Vec<&'a str>,
    price: Vec<&'a str>,
    date: Vec<&'a str>,
    time: Option<Vec<&'a str>>,
    fees: Vec<&'a str>,
    fill_id: Vec<&'a str>,
    currency: Vec<&'a str>,
}

impl<'a> Columns<'a> {
    fn resolve(mapping: Option<&'a ColumnMapping>) -> Self {
        let pick = |mapped: Option<&'a String>, aliases: &[&'a str]| -> Vec<&'a str> {
            match mapped {
                Some(name) => vec![name.as_str()],
                None => aliases.to_vec(),
            }
        };
        match mapping {
            None => Columns {
                symbol: SYMBOL.to_vec(),
                side: Some(SIDE.to_vec()),
                quantity: QUANTITY.to_vec(),
                price: PRICE.to_vec(),
                date: DATE.to_vec(),
                time: Some(TIME.to_vec()),
                fees: FEES.to_vec(),
                fill_id: FILL_ID.to_vec(),
                currency: CURRENCY.to_vec(),
            },
            Some(m) => {
                let mut fees: Vec<&str> = Vec::new();
                fees.extend(m.fees.as_deref());
                fees.extend(m.commission.as_deref());
                if fees.is_empty() {
                    fees = FEES.to_vec();
                }
                Columns {
                    symbol: pick(m.symbol.as_ref(), SYMBOL),
                    // With a mapping, a missing side column means "infer from sign".
                    side: m.side.as_deref().map(|s| vec![s]),
                    quantity: pick(m.quantity.as_ref(), QUANTITY),
                    price: pick(m.price.as_ref(), PRICE),
                    date: pick(m.date.as_ref(), DATE),
                    time: m.time.as_deref().map(|t| vec![t]),
                    fees,
                    fill_id: pick(m.fill_id.as_ref(), FILL_ID),
                    currency: pick(m.currency.as_ref(), CURRENCY),
                }
            }
        }
    }
}

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let columns = Columns::resolve(opts.mapping.as_ref());
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "generic", |h| {
        h.has_any(&columns.symbol) && h.has_any(&columns.quantity) && h.has_any(&columns.price)
    })?;
    if !table.header.has_any(&columns.date) {
        return Err(ImportError::MissingColumn {
            format: "generic".into(),
            column: columns.date.join("|"),
        });
    }
    Ok(table
        .rows
        .iter()
        .map(|row| parse_row_with(&table.header, row, opts, &columns))
        .collect())
}

pub fn parse_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    let columns = Columns::resolve(opts.mapping.as_ref());
    parse_row_with(header, row, opts, &columns)
}

fn parse_row_with(
    header: &HeaderIndex,
    row: &[String],
    opts: &ParseOptions,
    columns: &Columns<'_>,
) -> RowOutcome {
    map_row(header, row, opts, columns).into()
}

/// Side words accepted across generic exports.
pub fn side_from_text(text: &str) -> Option<Action> {
    let upper = text.trim().to_uppercase();
    match upper.as_str() {
        "B" | "BUY" | "BOT" | "BOUGHT" | "BTO" | "BTC" | "BUY TO OPEN" | "BUY TO CLOSE"
        | "BUY TO COVER" | "COVER" | "LONG" => Some(Action::Buy),
        "S" | "SELL" | "SLD" | "SOLD" | "SS" | "SHORT" | "SELL SHORT" | "STO" | "STC"
        | "SELL TO OPEN" | "SELL TO CLOSE" => Some(Action::Sell),
        _ if upper.starts_with("BUY") => Some(Action::Buy),
        _ if upper.starts_with("SELL") => Some(Action::Sell),
        _ => None,
    }
}

fn map_row(
    header: &HeaderIndex,
    row: &[String],
    opts: &ParseOptions,
    columns: &Columns<'_>,
) -> Result<RowOutcome, SkipReason> {
    let symbol = required_text(header, row, &columns.symbol, "symbol")?;
    let signed_qty = required_number(header, row, &columns.quantity, "quantity")?;
    let price = required_number(header, row, &columns.price, "price")?;

    let side_text = columns.side.as_ref().and_then(|names| header.get(row, names));
    let action = match side_text {
        Some(text) => {
            side_from_text(text).ok_or_else(|| SkipReason::UnknownSide(text.to_string()))?
        }
        None => Action::from_signed(signed_qty).ok_or(SkipReason::ZeroQuantity)?,
    };
    let quantity = to_quantity(signed_qty)?;

    let date = required_text(header, row, &columns.date, "date")?;
    let time = columns
        .time
        .as_ref()
        .and_then(|names| header.get(row, names))
        .filter(|t| *t != date);
    let timestamp = parse_date_time(date, time, opts)
        .ok_or_else(|| SkipReason::InvalidDate(date.to_string()))?;

    let fees = sum_fees(header, row, &columns.fees)?;
    let currency = header.get(row, &columns.currency).map(str::to_string);

    let mut tx = Transaction::new(symbol.to_uppercase(), action, quantity, price.abs(), timestamp)
        .with_fees(fees)
        .with_currency(currency);
    if let Some(id) = header.get(row, &columns.fill_id) {
        tx = tx.with_fill_id(id);
    }
    Ok(RowOutcome::Fill(tx))
}
