//! End-to-end imports through `import_file`.
//!
//! Covers the reconstruction scenarios, re-import idempotence, grouping,
//! collaborator pre-passes and a sample file per broker layout.

mod common;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use common::*;
use tradeimport::domain::error::ImportError;
use tradeimport::domain::format::FormatTag;
use tradeimport::domain::grouping::GroupingPolicy;
use tradeimport::domain::import::{ImportContext, import_file};
use tradeimport::domain::instrument::{InstrumentType, OptionType};
use tradeimport::domain::parsers::ColumnMapping;
use tradeimport::domain::trade::{SeedPosition, Side, Trade, TradeOrigin};
use tradeimport::domain::transaction::Action;

/// Feeds an outcome back in the way a caller persists it between imports.
fn carry_forward(ctx: &ImportContext, trades: &[Trade]) -> ImportContext {
    let mut next = ctx.clone();
    next.history.record_trades(trades);
    for (i, trade) in trades.iter().enumerate() {
        if let Some(seed) = SeedPosition::from_open_trade(format!("t-{i}"), trade) {
            next.existing_positions.insert(seed.symbol.clone(), seed);
        }
    }
    next
}

mod scenarios {
    use super::*;

    #[test]
    fn long_round_trip_without_prior_position() {
        let csv = generic_csv(&[
            fill("AAPL", Action::Buy, 100, 10.0, 0),
            fill("AAPL", Action::Sell, 100, 12.0, 30),
        ]);
        let outcome = import(&csv, &ctx());

        assert_eq!(outcome.format, FormatTag::Generic);
        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.side, Side::Long);
        assert_eq!(trade.quantity, 100);
        assert_relative_eq!(trade.entry_price, 10.0);
        assert_relative_eq!(trade.exit_price.unwrap(), 12.0);
        assert_relative_eq!(trade.pnl.unwrap(), 200.0);
        assert_eq!(trade.origin, TradeOrigin::New);
        assert_eq!(trade.executions.len(), 2);
    }

    #[test]
    fn seeded_position_closes_as_update() {
        let mut ctx = ctx();
        ctx.existing_positions
            .insert("AAPL".to_string(), seed("rec-42", "AAPL", Side::Long, 50, 10.0));
        let csv = generic_csv(&[fill("AAPL", Action::Sell, 50, 11.0, 0)]);
        let outcome = import(&csv, &ctx);

        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_relative_eq!(trade.entry_price, 10.0);
        assert_relative_eq!(trade.exit_price.unwrap(), 11.0);
        assert_eq!(trade.quantity, 50);
        assert_relative_eq!(trade.pnl.unwrap(), 50.0);
        assert_eq!(
            trade.origin,
            TradeOrigin::Update {
                trade_id: "rec-42".to_string()
            }
        );
        assert_eq!(outcome.stats.updates, 1);
        assert_eq!(trade.executions.len(), 2);
    }

    #[test]
    fn compact_option_symbol_uses_contract_multiplier() {
        let csv = generic_csv(&[
            fill("AAPL230120C00150000", Action::Buy, 2, 3.0, 0),
            fill("AAPL230120C00150000", Action::Sell, 2, 5.0, 60),
        ]);
        let outcome = import(&csv, &ctx());

        let trade = &outcome.trades[0];
        assert_eq!(trade.instrument.instrument_type, InstrumentType::Option);
        assert_relative_eq!(trade.instrument.strike.unwrap(), 150.0);
        assert_eq!(
            trade.instrument.expiration,
            NaiveDate::from_ymd_opt(2023, 1, 20)
        );
        assert_eq!(trade.instrument.option_type, Some(OptionType::Call));
        assert_eq!(trade.quantity, 2);
        assert_relative_eq!(trade.entry_value, 600.0);
        assert_relative_eq!(trade.exit_value, 1000.0);
        assert_relative_eq!(trade.pnl.unwrap(), 400.0);
    }

    #[test]
    fn fill_id_seen_in_an_earlier_file_is_ignored() {
        let first = generic_csv(&[
            fill("MSFT", Action::Buy, 10, 400.0, 0).with_fill_id("X-1"),
            fill("MSFT", Action::Sell, 10, 405.0, 10).with_fill_id("X-2"),
        ]);
        let ctx = ctx();
        let outcome = import(&first, &ctx);
        assert_eq!(outcome.trades.len(), 1);

        // Same broker id, different time and price.
        let second = generic_csv(&[fill("MSFT", Action::Sell, 10, 409.0, 600).with_fill_id("X-2")]);
        let next = carry_forward(&ctx, &outcome.trades);
        let again = import(&second, &next);
        assert!(again.trades.is_empty());
        assert_eq!(again.stats.duplicates, 1);
    }
}

mod reimport {
    use super::*;

    #[test]
    fn identical_file_yields_no_new_trades() {
        let csv = generic_csv(&[
            fill("TSLA", Action::Buy, 100, 180.0, 0),
            fill("TSLA", Action::Sell, 40, 182.0, 5),
            fill("TSLA", Action::Sell, 60, 183.0, 9),
            fill("NVDA", Action::Sell, 20, 900.0, 3),
            fill("NVDA", Action::Buy, 50, 890.0, 20),
        ]);
        let ctx = ctx();
        let first = import(&csv, &ctx);
        assert!(!first.trades.is_empty());

        let next = carry_forward(&ctx, &first.trades);
        let second = import(&csv, &next);
        assert!(second.trades.is_empty(), "{:?}", second.trades);
        assert_eq!(second.stats.duplicates, 5);
    }

    #[test]
    fn open_position_is_extended_on_the_next_import() {
        let ctx = ctx();
        let first = import(
            &generic_csv(&[fill("AMD", Action::Buy, 30, 150.0, 0)]),
            &ctx,
        );
        assert_eq!(first.stats.open_trades, 1);

        let next = carry_forward(&ctx, &first.trades);
        let second = import(
            &generic_csv(&[
                fill("AMD", Action::Buy, 30, 150.0, 0),
                fill("AMD", Action::Sell, 30, 160.0, 120),
            ]),
            &next,
        );
        assert_eq!(second.trades.len(), 1);
        let trade = &second.trades[0];
        assert!(trade.is_update());
        assert!(!trade.is_open());
        assert_relative_eq!(trade.pnl.unwrap(), 300.0);
        assert_eq!(second.stats.duplicates, 1);
    }

    #[test]
    fn partial_exit_is_kept_when_the_position_closes_later() {
        let ctx = ctx();
        let first = import(
            &generic_csv(&[
                fill("AAPL", Action::Buy, 100, 10.0, 0),
                fill("AAPL", Action::Sell, 60, 12.0, 5),
            ]),
            &ctx,
        );
        assert_eq!(first.trades.len(), 1);
        assert!(first.trades[0].is_open());
        assert_eq!(first.trades[0].quantity, 40);

        let next = carry_forward(&ctx, &first.trades);
        let second = import(
            &generic_csv(&[fill("AAPL", Action::Sell, 40, 13.0, 120)]),
            &next,
        );
        assert_eq!(second.trades.len(), 1);
        let trade = &second.trades[0];
        assert!(trade.is_update());
        assert!(!trade.is_open());
        assert_eq!(trade.quantity, 100);
        assert_relative_eq!(trade.entry_value, 1000.0);
        assert_relative_eq!(trade.exit_value, 720.0 + 520.0);
        assert_relative_eq!(trade.pnl.unwrap(), 240.0);

        let entry_side: f64 = trade
            .executions
            .iter()
            .filter(|e| e.action == Action::Buy)
            .map(|e| e.quantity as f64 * e.price)
            .sum();
        assert_relative_eq!(trade.entry_value, entry_side);
    }

    #[test]
    fn round_trip_rows_are_recognized_on_reimport() {
        let csv = "Symbol,Closed Date,Opened Date,Quantity,Proceeds Per Share,Cost Per Share,Gain/Loss ($)\n\
                   IBM,03/05/2024,03/01/2024,5,$200.00,$180.00,$100.00\n";
        let ctx = ctx();
        let first = import(csv, &ctx);
        assert_eq!(first.format, FormatTag::Schwab);
        assert_eq!(first.trades.len(), 1);

        let next = carry_forward(&ctx, &first.trades);
        let second = import(csv, &next);
        assert!(second.trades.is_empty());
        assert_eq!(second.stats.duplicates, 1);
    }
}

mod grouping {
    use super::*;

    #[test]
    fn nearby_same_side_trades_merge() {
        let csv = generic_csv(&[
            fill("QQQ", Action::Buy, 10, 100.0, 0),
            fill("QQQ", Action::Sell, 10, 101.0, 5),
            fill("QQQ", Action::Buy, 20, 110.0, 10),
            fill("QQQ", Action::Sell, 20, 111.0, 15),
        ]);
        let mut ctx = ctx();
        ctx.grouping = GroupingPolicy {
            enabled: true,
            time_gap_minutes: 60,
        };
        let outcome = import(&csv, &ctx);

        assert_eq!(outcome.trades.len(), 1);
        let group = &outcome.trades[0];
        assert_eq!(group.quantity, 30);
        assert_eq!(group.group_count, 2);
        assert!(group.entry_price > 100.0 && group.entry_price < 110.0);
        assert_relative_eq!(group.pnl.unwrap(), 30.0);
        assert_eq!(group.executions.len(), 4);
    }

    #[test]
    fn open_trade_stays_a_separate_reseedable_position() {
        let mut ctx = ctx();
        ctx.grouping = GroupingPolicy {
            enabled: true,
            time_gap_minutes: 60,
        };
        let first = import(
            &generic_csv(&[
                fill("QQQ", Action::Buy, 50, 100.0, 0),
                fill("QQQ", Action::Sell, 50, 101.0, 5),
                fill("QQQ", Action::Buy, 50, 102.0, 10),
            ]),
            &ctx,
        );
        assert_eq!(first.trades.len(), 2);
        let open: Vec<&Trade> = first.trades.iter().filter(|t| t.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity, 50);
        assert_eq!(open[0].group_count, 1);

        let next = carry_forward(&ctx, &first.trades);
        let second = import(
            &generic_csv(&[fill("QQQ", Action::Sell, 50, 103.0, 120)]),
            &next,
        );
        assert_eq!(second.trades.len(), 1);
        let trade = &second.trades[0];
        assert!(trade.is_update());
        assert!(!trade.is_open());
        assert_eq!(trade.quantity, 50);
        assert_relative_eq!(trade.pnl.unwrap(), 50.0);
        assert_eq!(second.stats.open_trades, 0);
    }

    #[test]
    fn disabled_policy_keeps_trades_apart() {
        let csv = generic_csv(&[
            fill("QQQ", Action::Buy, 10, 100.0, 0),
            fill("QQQ", Action::Sell, 10, 101.0, 5),
            fill("QQQ", Action::Buy, 20, 110.0, 10),
            fill("QQQ", Action::Sell, 20, 111.0, 15),
        ]);
        let outcome = import(&csv, &ctx());
        assert_eq!(outcome.trades.len(), 2);
        assert!(outcome.trades.iter().all(|t| t.group_count == 1));
    }
}

mod collaborators {
    use super::*;

    const FLAT_IBKR: &str = "Symbol,Date/Time,Quantity,T. Price,Comm/Fee,Currency\n\
                             SAP,2024-03-01 09:00:00,10,100,0,EUR\n\
                             SAP,2024-03-01 15:00:00,-10,110,0,EUR\n";

    #[test]
    fn foreign_fills_convert_once_per_currency_and_day() {
        let mut ctx = ctx();
        ctx.currency_conversion = true;
        let rates = MockCurrencyPort::new().with_rate("EUR", 1.1);
        let outcome = import_file(
            FLAT_IBKR.as_bytes(),
            &ctx,
            &MockIdentifierPort::new(),
            &rates,
        )
        .unwrap();

        assert_eq!(outcome.format, FormatTag::Ibkr);
        assert_eq!(rates.calls.borrow().len(), 1);
        let trade = &outcome.trades[0];
        assert_relative_eq!(trade.entry_price, 110.0, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl.unwrap(), 110.0, epsilon = 1e-9);
        assert!(trade
            .executions
            .iter()
            .all(|e| e.currency.as_deref() == Some("USD")));
    }

    #[test]
    fn foreign_fills_without_entitlement_fail_before_lookup() {
        let rates = MockCurrencyPort::new().with_rate("EUR", 1.1);
        let err = import_file(
            FLAT_IBKR.as_bytes(),
            &ctx(),
            &MockIdentifierPort::new(),
            &rates,
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::EntitlementRequired { ref currency } if currency == "EUR"));
        assert!(rates.calls.borrow().is_empty());
    }

    #[test]
    fn missing_rate_is_a_collaborator_error() {
        let mut ctx = ctx();
        ctx.currency_conversion = true;
        let err = import_file(
            FLAT_IBKR.as_bytes(),
            &ctx,
            &MockIdentifierPort::new(),
            &MockCurrencyPort::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::CurrencyConversion { .. }));
    }

    #[test]
    fn identifiers_resolve_in_one_batch() {
        let csv = generic_csv(&[
            fill("037833100", Action::Buy, 10, 190.0, 0),
            fill("037833100", Action::Sell, 10, 191.0, 5),
            fill("594918104", Action::Buy, 5, 400.0, 10),
        ]);
        let identifiers = MockIdentifierPort::new().with_ticker("037833100", "aapl");
        let outcome = import_file(
            csv.as_bytes(),
            &ctx(),
            &identifiers,
            &MockCurrencyPort::new(),
        )
        .unwrap();

        assert_eq!(
            *identifiers.calls.borrow(),
            vec![vec!["037833100".to_string(), "594918104".to_string()]]
        );
        let symbols: Vec<&str> = outcome.trades.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAPL", "594918104"]);
        assert_eq!(outcome.unresolved_identifiers, vec!["594918104".to_string()]);
    }

    #[test]
    fn resolver_failure_aborts_the_import() {
        let csv = generic_csv(&[fill("037833100", Action::Buy, 10, 190.0, 0)]);
        let err = import_file(
            csv.as_bytes(),
            &ctx(),
            &MockIdentifierPort::new().failing("service down"),
            &MockCurrencyPort::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::IdentifierResolution { .. }));
    }

    #[test]
    fn plain_tickers_never_reach_the_resolver() {
        let identifiers = MockIdentifierPort::new();
        let csv = generic_csv(&[fill("AAPL", Action::Buy, 1, 1.0, 0)]);
        import_file(csv.as_bytes(), &ctx(), &identifiers, &MockCurrencyPort::new()).unwrap();
        assert!(identifiers.calls.borrow().is_empty());
    }
}

mod broker_files {
    use super::*;

    #[test]
    fn thinkorswim_statement() {
        let text = "\
Account Statement for 12345 (margin) since 1/2/24 through 1/3/24

Cash Balance
DATE,TIME,TYPE,REF #,DESCRIPTION,Misc Fees,Commissions & Fees,AMOUNT,BALANCE
1/2/24,00:00:00,BAL,,Cash balance at the start of business day,,,,10000.00
1/2/24,09:35:12,TRD,=4021,BOT +60 AAPL @185.00,-0.01,-0.65,\"-11,100.66\",
1/2/24,09:35:12,TRD,=4021,BOT +40 AAPL @186.00,,-0.35,\"-7,440.35\",
1/2/24,14:10:00,TRD,=4030,SOLD -100 AAPL @187.40,,-0.99,\"18,739.01\",
1/2/24,11:00:00,DOI,=4023,ORDINARY DIVIDEND,,,12.00,
";
        let outcome = import(text, &ctx());
        assert_eq!(outcome.format, FormatTag::Thinkorswim);
        assert_eq!(outcome.stats.rows, 5);
        assert_eq!(outcome.stats.skipped, 3);
        assert_eq!(outcome.trades.len(), 1);

        let trade = &outcome.trades[0];
        assert_eq!(trade.quantity, 100);
        assert_relative_eq!(trade.entry_price, 185.40, epsilon = 1e-9);
        assert_relative_eq!(trade.fees, 2.0, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl.unwrap(), 200.0 - 2.0, epsilon = 1e-6);
    }

    #[test]
    fn ibkr_embedded_statement() {
        let text = "\
Statement,Header,Field Name,Field Value
Trades,Header,DataDiscriminator,Asset Category,Currency,Symbol,Date/Time,Quantity,T. Price,C. Price,Proceeds,Comm/Fee
Trades,Data,Order,Stocks,USD,AAPL,\"2024-01-15, 10:30:00\",100,185.5,186,-18550,-1
Trades,Data,Order,Stocks,USD,AAPL,\"2024-01-15, 11:00:00\",-100,187,186,18700,-1
Trades,SubTotal,,Stocks,USD,AAPL,,0,,,150,-2
";
        let outcome = import(text, &ctx());
        assert_eq!(outcome.format, FormatTag::Ibkr);
        let closed = closed(&outcome.trades);
        assert_eq!(closed.len(), 1);
        assert_relative_eq!(closed[0].pnl.unwrap(), 148.0, epsilon = 1e-9);
    }

    #[test]
    fn ibkr_confirmation_option_economics() {
        let text = "Symbol,UnderlyingSymbol,Strike,Expiry,Put/Call,Multiplier,Buy/Sell,Quantity,Price,Commission,Date/Time,TradeID,CurrencyPrimary\n\
                    AAPL  240119P00152500,AAPL,152.5,20240119,P,100,SELL,-3,2.40,-1.95,20240110;143000,9001,USD\n\
                    AAPL  240119P00152500,AAPL,152.5,20240119,P,100,BUY,3,1.40,-1.95,20240111;143000,9002,USD\n";
        let outcome = import(text, &ctx());
        assert_eq!(outcome.format, FormatTag::IbkrTradeConfirmation);
        assert_eq!(outcome.trades.len(), 1);
        let trade = &outcome.trades[0];
        assert_eq!(trade.side, Side::Short);
        assert_eq!(trade.quantity, 3);
        assert_eq!(trade.instrument.instrument_type, InstrumentType::Option);
        assert_relative_eq!(trade.pnl.unwrap(), 300.0 - 3.9, epsilon = 1e-9);
    }

    #[test]
    fn lightspeed_fees_flow_into_pnl() {
        let text = "Trade Date,Execution Time,Symbol,Side,Qty,Price,Buy/Sell,Trade Number,Commission Amount,SEC Fee\n\
                    07/01/2024,09:45:10,TSLA,B,200,182.40,Buy,LS-1,1.00,0.00\n\
                    07/01/2024,10:15:00,TSLA,S,200,183.40,Sell,LS-2,1.00,0.05\n";
        let outcome = import(text, &ctx());
        assert_eq!(outcome.format, FormatTag::Lightspeed);
        assert_relative_eq!(outcome.trades[0].fees, 2.05, epsilon = 1e-9);
        assert_relative_eq!(outcome.trades[0].pnl.unwrap(), 200.0 - 2.05, epsilon = 1e-6);
    }

    #[test]
    fn tradingview_skips_unfilled_orders() {
        let text = "Symbol,Side,Type,Qty,Limit Price,Stop Price,Fill Price,Status,Commission,Placing Time,Closing Time,Order ID\n\
                    NASDAQ:AAPL,Buy,Market,10,,,190.10,Filled,0.5,2024-06-03 14:00:00,2024-06-03 14:00:01,1001\n\
                    NASDAQ:AAPL,Sell,Limit,10,195,,,Cancelled,,2024-06-03 14:05:00,,1002\n";
        let outcome = import(text, &ctx());
        assert_eq!(outcome.format, FormatTag::Tradingview);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.open_trades, 1);
        assert_eq!(outcome.trades[0].symbol, "AAPL");
    }

    #[test]
    fn projectx_round_trips_bypass_tracking() {
        let text = "Id,ContractName,EnteredAt,ExitedAt,EntryPrice,ExitPrice,Fees,Commissions,PnL,Size,Type\n\
                    77,MNQZ4,2024-11-04T14:30:00+00:00,2024-11-04T14:45:00+00:00,20000.00,20010.00,0.74,0.50,38.76,2,Long\n";
        let outcome = import(text, &ctx());
        assert_eq!(outcome.format, FormatTag::Projectx);
        assert_eq!(outcome.stats.round_trips, 1);
        assert_eq!(outcome.stats.fills, 0);
        assert_eq!(outcome.trades[0].instrument.instrument_type, InstrumentType::Future);
    }

    #[test]
    fn papermoney_without_filled_orders_fails_the_file() {
        let text = "Today's Trade Activity\n\nWorking Orders\nNotes,,Time Placed,Spread\n";
        let err = import_file(
            text.as_bytes(),
            &ctx(),
            &MockIdentifierPort::new(),
            &MockCurrencyPort::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::MissingSection { .. }));
    }

    #[test]
    fn custom_mapping_infers_side_from_sign() {
        let text = "Ticker,Shares,Px,When\n\
                    AMZN,15,170.00,2024-05-01 10:00:00\n\
                    AMZN,-15,175.00,2024-05-01 11:00:00\n";
        let mut ctx = ctx();
        ctx.format = Some(FormatTag::Generic);
        ctx.mapping = Some(ColumnMapping {
            symbol: Some("Ticker".to_string()),
            quantity: Some("Shares".to_string()),
            price: Some("Px".to_string()),
            date: Some("When".to_string()),
            ..Default::default()
        });
        let outcome = import(text, &ctx);
        assert_eq!(outcome.trades.len(), 1);
        assert_relative_eq!(outcome.trades[0].pnl.unwrap(), 75.0);
    }

    #[test]
    fn trades_are_ordered_by_entry_time_then_symbol() {
        let csv = generic_csv(&[
            fill("ZZZ", Action::Buy, 1, 1.0, 0),
            fill("AAA", Action::Buy, 1, 1.0, 0),
            fill("MMM", Action::Buy, 1, 1.0, -5),
        ]);
        let outcome = import(&csv, &ctx());
        let symbols: Vec<&str> = outcome.trades.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["MMM", "AAA", "ZZZ"]);
    }
}
