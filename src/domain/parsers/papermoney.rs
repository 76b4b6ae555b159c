//! thinkorswim PaperMoney trade activity. Only the `Filled Orders` section is read.

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::{OptionType, readable_option_symbol};
use crate::domain::transaction::{Action, SettlementCode, Transaction};

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, parse_number, parse_timestamp, read_records,
    required_number, required_text, spelled_expiration, table_after_header, to_quantity,
};
use super::generic::side_from_text;

const FILLED_SECTION: &str = "filled orders";

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let section = filled_section(read_records(text, b',')?)?;
    let table = table_after_header(section, "papermoney", |h| {
        h.has("exec time") && h.has("symbol")
    })?;
    let exec_column = table.header.position(&["exec time"]);

    // Later legs of a spread leave Exec Time blank and inherit the first leg's.
    let mut last_exec: Option<String> = None;
    let mut outcomes = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut row = row.clone();
        if let Some(i) = exec_column {
            if i < row.len() && row[i].is_empty() {
                if let Some(previous) = &last_exec {
                    row[i] = previous.clone();
                }
            } else if let Some(value) = row.get(i) {
                last_exec = Some(value.clone());
            }
        }
        outcomes.push(parse_row(&table.header, &row, opts));
    }
    Ok(outcomes)
}

/// Records between the `Filled Orders` title and the next section title.
fn filled_section(records: Vec<Vec<String>>) -> Result<Vec<Vec<String>>, ImportError> {
    let title = |record: &Vec<String>| -> Option<String> {
        let mut cells = record.iter().filter(|c| !c.is_empty());
        let only = cells.next()?;
        cells.next().is_none().then(|| only.to_lowercase())
    };

    let mut iter = records.into_iter();
    if !iter.by_ref().any(|r| title(&r).as_deref() == Some(FILLED_SECTION)) {
        return Err(ImportError::MissingSection {
            format: "papermoney".into(),
            section: "Filled Orders".into(),
        });
    }
    Ok(iter.take_while(|r| title(r).is_none()).collect())
}

pub fn parse_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> RowOutcome {
    map_row(header, row, opts).into()
}

fn map_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let exec_time = required_text(header, row, &["exec time"], "exec time")?;
    let timestamp = parse_timestamp(exec_time, opts)
        .ok_or_else(|| SkipReason::InvalidDate(exec_time.to_string()))?;

    let signed_qty = required_number(header, row, &["qty"], "quantity")?;
    let action = match header.get(row, &["side"]) {
        Some(side) => {
            side_from_text(side).ok_or_else(|| SkipReason::UnknownSide(side.to_string()))?
        }
        None => Action::from_signed(signed_qty).ok_or(SkipReason::ZeroQuantity)?,
    };
    let quantity = to_quantity(signed_qty)?;
    let price = required_number(header, row, &["price"], "price")?;

    let root = required_text(header, row, &["symbol"], "symbol")?;
    let symbol = match option_symbol(header, row, root, opts.reference_year) {
        Some(symbol) => symbol,
        None => root.to_uppercase(),
    };

    let settlement = header
        .get(row, &["pos effect"])
        .and_then(|effect| match effect.to_uppercase().as_str() {
            "TO OPEN" => Some(SettlementCode::Open),
            "TO CLOSE" => Some(SettlementCode::Close),
            _ => None,
        });

    Ok(RowOutcome::Fill(
        Transaction::new(symbol, action, quantity, price, timestamp).with_settlement(settlement),
    ))
}

fn option_symbol(header: &HeaderIndex, row: &[String], root: &str, reference_year: i32) -> Option<String> {
    let option_type = OptionType::parse(header.get(row, &["type"])?)?;
    let expiration = spelled_expiration(header.get(row, &["exp"])?, reference_year)?;
    let strike = parse_number(header.get(row, &["strike"])?)?;
    Some(readable_option_symbol(root, expiration, strike, option_type))
}
