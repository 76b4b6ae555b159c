//! End-to-end import of one broker file.
//!
//! Collaborator lookups (identifier resolution, currency rates) happen in a
//! batch pre-pass over the distinct values in the file. Everything after that
//! is a pure function of the parsed rows and the caller's prior state.

use chrono::{Datelike, FixedOffset, NaiveDate, Offset, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::ports::currency_port::CurrencyPort;
use crate::ports::identifier_port::IdentifierPort;

use super::duplicate::{ExecutionHistory, is_duplicate};
use super::error::ImportError;
use super::format::{FormatTag, detect_text};
use super::grouping::{GroupingPolicy, group_trades};
use super::instrument::{Instrument, classify_as_of};
use super::parsers::{ColumnMapping, ParseOptions, ParsedFile, parse_file};
use super::position_tracker::{build_trades, resolve_instrument};
use super::trade::{SeedPosition, Trade};
use super::transaction::Transaction;

const BASE_CURRENCY: &str = "USD";

static CUSIP_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Z]{8}[0-9]$").expect("valid regex"));

/// Everything the caller already knows going into an import.
#[derive(Debug, Clone)]
pub struct ImportContext {
    /// Open positions from earlier imports, keyed by symbol (or underlying for options).
    pub existing_positions: HashMap<String, SeedPosition>,
    /// Executions already recorded in completed or open trades.
    pub history: ExecutionHistory,
    pub mapping: Option<ColumnMapping>,
    pub grouping: GroupingPolicy,
    /// Forces a parser instead of detecting one.
    pub format: Option<FormatTag>,
    pub utc_offset: FixedOffset,
    pub reference_year: i32,
    /// Whether the caller may convert non-USD prices.
    pub currency_conversion: bool,
    pub user_id: Option<String>,
}

impl Default for ImportContext {
    fn default() -> Self {
        ImportContext {
            existing_positions: HashMap::new(),
            history: ExecutionHistory::new(),
            mapping: None,
            grouping: GroupingPolicy::default(),
            format: None,
            utc_offset: Utc.fix(),
            reference_year: Utc::now().year(),
            currency_conversion: false,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub rows: usize,
    pub fills: usize,
    pub round_trips: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub trades: usize,
    pub open_trades: usize,
    pub updates: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub format: FormatTag,
    /// Ordered by entry time, then symbol.
    pub trades: Vec<Trade>,
    /// Codes the identifier port could not map; their trades use the raw code.
    pub unresolved_identifiers: Vec<String>,
    pub stats: ImportStats,
}

/// Imports one file against the caller's prior state.
pub fn import_file(
    bytes: &[u8],
    ctx: &ImportContext,
    identifiers: &dyn IdentifierPort,
    rates: &dyn CurrencyPort,
) -> Result<ImportOutcome, ImportError> {
    let text = decode(bytes);
    let format = ctx.format.unwrap_or_else(|| detect_text(&text));
    info!(%format, bytes = bytes.len(), "importing file");

    let opts = ParseOptions {
        utc_offset: ctx.utc_offset,
        reference_year: ctx.reference_year,
        mapping: ctx.mapping.clone(),
    };
    let mut parsed = parse_file(&text, format, &opts)?;

    let unresolved = resolve_identifiers(&mut parsed, identifiers, ctx.user_id.as_deref())?;
    convert_currencies(&mut parsed.fills, ctx.currency_conversion, rates)?;

    let mut history = ctx.history.clone();
    history.record_seeds(ctx.existing_positions.values());

    let mut stats = ImportStats {
        rows: parsed.rows,
        fills: parsed.fills.len(),
        round_trips: parsed.round_trips.len(),
        skipped: parsed.skipped,
        malformed: parsed.malformed,
        ..Default::default()
    };

    let mut trades = Vec::new();
    let mut used_seeds: HashSet<&str> = HashSet::new();
    for (symbol, fills) in fills_by_symbol(parsed.fills) {
        let instrument = resolve_instrument(&symbol, &fills, None, ctx.reference_year);
        let seed = find_seed(&ctx.existing_positions, &symbol, &instrument, ctx.reference_year)
            .filter(|seed| used_seeds.insert(seed.trade_id.as_str()));
        if let Some(seed) = seed {
            debug!(symbol = %symbol, trade_id = %seed.trade_id, "extending existing position");
        }
        let built = build_trades(&symbol, &fills, seed, &history, ctx.reference_year);
        stats.duplicates += built.duplicates;
        trades.extend(built.trades);
    }

    for trade in parsed.round_trips {
        let recorded = !trade.executions.is_empty()
            && trade
                .executions
                .iter()
                .all(|e| is_duplicate(e, &trade.symbol, &history));
        if recorded {
            debug!(symbol = %trade.symbol, "skipping previously recorded round trip");
            stats.duplicates += 1;
        } else {
            trades.push(trade);
        }
    }

    let mut trades = group_trades(trades, &ctx.grouping);
    trades.sort_by(|a, b| {
        a.entry_time
            .cmp(&b.entry_time)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    stats.trades = trades.len();
    stats.open_trades = trades.iter().filter(|t| t.is_open()).count();
    stats.updates = trades.iter().filter(|t| t.is_update()).count();
    info!(
        %format,
        rows = stats.rows,
        fills = stats.fills,
        round_trips = stats.round_trips,
        skipped = stats.skipped,
        duplicates = stats.duplicates,
        trades = stats.trades,
        open = stats.open_trades,
        updates = stats.updates,
        "import finished"
    );

    Ok(ImportOutcome {
        format,
        trades,
        unresolved_identifiers: unresolved,
        stats,
    })
}

/// Lossy UTF-8 without a leading byte-order mark.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// True for nine-character codes carrying a valid CUSIP check digit.
pub fn is_cusip(symbol: &str) -> bool {
    if !CUSIP_SHAPE.is_match(symbol) {
        return false;
    }
    let mut sum = 0;
    for (i, c) in symbol.chars().take(8).enumerate() {
        let Some(mut value) = c.to_digit(36) else {
            return false;
        };
        if i % 2 == 1 {
            value *= 2;
        }
        sum += value / 10 + value % 10;
    }
    let check = (10 - sum % 10) % 10;
    symbol.chars().nth(8).and_then(|c| c.to_digit(10)) == Some(check)
}

fn resolve_identifiers(
    parsed: &mut ParsedFile,
    identifiers: &dyn IdentifierPort,
    user_id: Option<&str>,
) -> Result<Vec<String>, ImportError> {
    let codes: BTreeSet<String> = parsed
        .fills
        .iter()
        .map(|f| f.symbol.as_str())
        .chain(parsed.round_trips.iter().map(|t| t.symbol.as_str()))
        .filter(|s| is_cusip(s))
        .map(str::to_string)
        .collect();
    if codes.is_empty() {
        return Ok(Vec::new());
    }

    let codes: Vec<String> = codes.into_iter().collect();
    let resolved = identifiers.resolve(&codes, user_id)?;
    info!(
        requested = codes.len(),
        resolved = resolved.len(),
        "resolved security identifiers"
    );

    let rename = |symbol: &mut String| {
        if let Some(ticker) = resolved.get(symbol.as_str()) {
            *symbol = ticker.to_uppercase();
        }
    };
    for fill in &mut parsed.fills {
        rename(&mut fill.symbol);
    }
    for trade in &mut parsed.round_trips {
        rename(&mut trade.symbol);
        for execution in &mut trade.executions {
            rename(&mut execution.symbol);
        }
    }

    Ok(codes
        .into_iter()
        .filter(|code| !resolved.contains_key(code))
        .collect())
}

/// Rewrites non-USD prices and fees in USD, one rate lookup per currency and day.
fn convert_currencies(
    fills: &mut [Transaction],
    entitled: bool,
    rates: &dyn CurrencyPort,
) -> Result<(), ImportError> {
    let foreign: BTreeSet<(String, NaiveDate)> = fills
        .iter()
        .filter_map(|f| {
            let currency = f.currency.as_deref()?;
            (currency != BASE_CURRENCY).then(|| (currency.to_string(), f.timestamp.date_naive()))
        })
        .collect();
    let Some((first, _)) = foreign.first() else {
        return Ok(());
    };
    if !entitled {
        return Err(ImportError::EntitlementRequired {
            currency: first.clone(),
        });
    }

    let mut table: HashMap<(String, NaiveDate), f64> = HashMap::new();
    for (currency, day) in foreign {
        let rate = rates.usd_rate(&currency, day)?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ImportError::CurrencyConversion {
                currency,
                reason: format!("unusable rate {rate} for {day}"),
            });
        }
        table.insert((currency, day), rate);
    }

    for fill in fills.iter_mut() {
        let Some(currency) = fill.currency.clone() else {
            continue;
        };
        if let Some(rate) = table.get(&(currency, fill.timestamp.date_naive())) {
            fill.price *= rate;
            fill.fees *= rate;
            fill.currency = Some(BASE_CURRENCY.to_string());
        }
    }
    Ok(())
}

/// Groups fills by symbol, each list in stable timestamp order.
fn fills_by_symbol(fills: Vec<Transaction>) -> BTreeMap<String, Vec<Transaction>> {
    let mut by_symbol: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
    for fill in fills {
        by_symbol.entry(fill.symbol.clone()).or_default().push(fill);
    }
    for fills in by_symbol.values_mut() {
        fills.sort_by_key(|f| f.timestamp);
    }
    by_symbol
}

fn seed_instrument(seed: &SeedPosition, reference_year: i32) -> Instrument {
    seed.instrument
        .clone()
        .unwrap_or_else(|| classify_as_of(&seed.symbol, reference_year))
}

/// Seed for a symbol: exact match, then the same option contract under
/// another spelling, then an option seed filed under the underlying.
pub fn find_seed<'a>(
    positions: &'a HashMap<String, SeedPosition>,
    symbol: &str,
    instrument: &Instrument,
    reference_year: i32,
) -> Option<&'a SeedPosition> {
    let exact = positions
        .get(symbol)
        .filter(|s| s.symbol.eq_ignore_ascii_case(symbol))
        .or_else(|| positions.values().find(|s| s.symbol.eq_ignore_ascii_case(symbol)));
    if exact.is_some() {
        return exact;
    }
    let key = instrument.contract_key()?;
    let mut candidates: Vec<&SeedPosition> = positions.values().collect();
    candidates.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));
    if let Some(seed) = candidates
        .into_iter()
        .find(|s| seed_instrument(s, reference_year).contract_key().as_deref() == Some(key.as_str()))
    {
        return Some(seed);
    }
    let underlying = instrument.underlying.as_deref()?;
    positions.get(underlying).filter(|seed| {
        let seed_inst = seed_instrument(seed, reference_year);
        seed_inst.is_option() && seed_inst.contract_key().is_none_or(|k| k == key)
    })
}
