//! ProjectX trade exports. Each row is already a completed round trip.

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::classify_as_of;
use crate::domain::trade::{Side, Trade};
use crate::domain::transaction::Transaction;

use super::common::{
    HeaderIndex, ParseOptions, RowOutcome, optional_number, parse_timestamp, read_records,
    required_number, required_text, sum_fees, table_after_header, to_quantity,
};

const COMPLETED: &[&str] = &["filled", "completed", "closed"];

pub fn parse(text: &str, opts: &ParseOptions) -> Result<Vec<RowOutcome>, ImportError> {
    let records = read_records(text, b',')?;
    let table = table_after_header(records, "projectx", |h| {
        h.has("contractname") && h.has("enteredat")
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

fn map_row(header: &HeaderIndex, row: &[String], opts: &ParseOptions) -> Result<RowOutcome, SkipReason> {
    let status = header.get(row, &["status"]);
    if status.is_some_and(|status| !COMPLETED.iter().any(|s| status.eq_ignore_ascii_case(s))) {
        return Err(SkipReason::Unfilled);
    }
    // A round trip without an exit has not completed.
    let Some(exited) = header.get(row, &["exitedat"]) else {
        return Err(SkipReason::Unfilled);
    };
    let Some(exit_price) = optional_number(header, row, &["exitprice"], "exit price")? else {
        return Err(SkipReason::Unfilled);
    };

    let symbol = required_text(header, row, &["contractname"], "contract")?.to_uppercase();
    let side_text = required_text(header, row, &["type", "side"], "type")?;
    let side = match side_text.to_lowercase().as_str() {
        "long" | "buy" => Side::Long,
        "short" | "sell" => Side::Short,
        _ => return Err(SkipReason::UnknownSide(side_text.to_string())),
    };
    let quantity = to_quantity(required_number(header, row, &["size", "quantity"], "size")?)?;
    let entry_price = required_number(header, row, &["entryprice"], "entry price")?;

    let entered = required_text(header, row, &["enteredat"], "entered at")?;
    let entry_time = parse_timestamp(entered, opts)
        .ok_or_else(|| SkipReason::InvalidDate(entered.to_string()))?;
    let exit_time =
        parse_timestamp(exited, opts).ok_or_else(|| SkipReason::InvalidDate(exited.to_string()))?;

    let fees = sum_fees(header, row, &["fees", "commissions"])?;
    let instrument = classify_as_of(&symbol, opts.reference_year);
    let mut trade = Trade::round_trip(
        &symbol,
        side,
        quantity,
        entry_price,
        exit_price,
        entry_time,
        exit_time,
        fees,
        instrument,
    );

    let id = header.get(row, &["id"]);
    let mut entry = Transaction::new(&symbol, side.entry_action(), quantity, entry_price, entry_time)
        .with_fees(fees);
    let mut exit = Transaction::new(
        &symbol,
        side.entry_action().opposite(),
        quantity,
        exit_price,
        exit_time,
    );
    if let Some(id) = id {
        entry = entry.with_fill_id(format!("{id}:entry"));
        exit = exit.with_fill_id(format!("{id}:exit"));
    }
    trade.executions = vec![entry, exit];
    Ok(RowOutcome::RoundTrip(trade))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::InstrumentType;
    use approx::assert_relative_eq;
    use chrono::FixedOffset;

    fn opts() -> ParseOptions {
        ParseOptions {
            utc_offset: FixedOffset::east_opt(0).unwrap(),
            reference_year: 2025,
            mapping: None,
        }
    }

    const HEADER: &str = "Id,ContractName,EnteredAt,ExitedAt,EntryPrice,ExitPrice,Fees,Commissions,PnL,Size,Type\n";

    #[test]
    fn completed_row_is_a_round_trip() {
        let csv = format!(
            "{HEADER}77,MNQZ4,2024-11-04T14:30:00+00:00,2024-11-04T14:45:00+00:00,20000.00,20010.00,0.74,0.50,38.76,2,Long\n"
        );
        let outcomes = parse(&csv, &opts()).unwrap();
        let RowOutcome::RoundTrip(trade) = &outcomes[0] else {
            panic!("expected round trip");
        };
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.quantity, 2);
        assert_eq!(trade.instrument.instrument_type, InstrumentType::Future);
        assert_relative_eq!(trade.instrument.multiplier, 2.0);
        assert_relative_eq!(trade.fees, 1.24, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl.unwrap(), 40.0 - 1.24, epsilon = 1e-9);
        assert_eq!(trade.executions.len(), 2);
        assert_eq!(trade.executions[0].broker_fill_id.as_deref(), Some("77:entry"));
        assert_eq!(trade.executions[1].broker_fill_id.as_deref(), Some("77:exit"));
    }

    #[test]
    fn open_or_unfilled_rows_are_skipped() {
        let csv = format!(
            "{HEADER}78,ESZ4,2024-11-04T14:30:00+00:00,,5800,,,,,1,Short\n\
             79,ESZ4,2024-11-04T14:30:00+00:00,2024-11-04T14:31:00+00:00,5800,5799,,,,1,Sideways\n"
        );
        let outcomes = parse(&csv, &opts()).unwrap();
        assert_eq!(outcomes[0], RowOutcome::Skip(SkipReason::Unfilled));
        assert!(matches!(outcomes[1], RowOutcome::Skip(SkipReason::UnknownSide(_))));
    }

    #[test]
    fn status_column_is_honored() {
        let csv = "Id,ContractName,EnteredAt,ExitedAt,EntryPrice,ExitPrice,Size,Type,Status\n\
                   1,ESZ4,2024-11-04 14:30:00,2024-11-04 14:31:00,5800,5801,1,Long,Cancelled\n";
        let outcomes = parse(csv, &opts()).unwrap();
        assert_eq!(outcomes[0], RowOutcome::Skip(SkipReason::Unfilled));
    }
}
