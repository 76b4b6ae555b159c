//! Broker row parsers.
//!
//! Every format is a peer: a plain function from file text to row outcomes,
//! looked up by [`FormatTag`] in [`parser_for`].

pub mod common;
pub mod etrade;
pub mod generic;
pub mod ibkr;
pub mod lightspeed;
pub mod papermoney;
pub mod projectx;
pub mod schwab;
pub mod thinkorswim;
pub mod tradingview;

use tracing::{debug, warn};

use super::error::ImportError;
use super::format::FormatTag;
use super::trade::Trade;
use super::transaction::Transaction;

pub use common::{ParseOptions, RowOutcome};
pub use generic::ColumnMapping;

pub type ParseFn = fn(&str, &ParseOptions) -> Result<Vec<RowOutcome>, ImportError>;

pub fn parser_for(format: FormatTag) -> ParseFn {
    match format {
        FormatTag::Generic => generic::parse,
        FormatTag::Lightspeed => lightspeed::parse,
        FormatTag::Thinkorswim => thinkorswim::parse,
        FormatTag::Tradingview => tradingview::parse,
        FormatTag::Schwab => schwab::parse_gain_loss,
        FormatTag::SchwabTransactions => schwab::parse_transactions,
        FormatTag::Ibkr => ibkr::parse_activity,
        FormatTag::IbkrTradeConfirmation => ibkr::parse_confirmation,
        FormatTag::Etrade => etrade::parse,
        FormatTag::Papermoney => papermoney::parse,
        FormatTag::Projectx => projectx::parse,
    }
}

/// Row outcomes of one file, split by kind.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub fills: Vec<Transaction>,
    pub round_trips: Vec<Trade>,
    /// Data rows seen after the header.
    pub rows: usize,
    pub skipped: usize,
    /// Skipped rows that were broken rather than merely not trades.
    pub malformed: usize,
}

/// Parses a whole file with the parser for `format`.
///
/// Structural problems fail the file; bad rows are logged and counted.
pub fn parse_file(
    text: &str,
    format: FormatTag,
    opts: &ParseOptions,
) -> Result<ParsedFile, ImportError> {
    let outcomes = parser_for(format)(text, opts)?;
    let mut parsed = ParsedFile {
        rows: outcomes.len(),
        ..Default::default()
    };
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            RowOutcome::Fill(tx) => parsed.fills.push(tx),
            RowOutcome::RoundTrip(trade) => parsed.round_trips.push(trade),
            RowOutcome::Skip(reason) => {
                parsed.skipped += 1;
                if reason.is_malformed() {
                    parsed.malformed += 1;
                    warn!(%format, row = index + 1, %reason, "skipping malformed row");
                } else {
                    debug!(%format, row = index + 1, %reason, "skipping row");
                }
            }
        }
    }
    Ok(parsed)
}
