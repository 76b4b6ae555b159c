//! Broker export format tags and header-signature detection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Number of non-empty leading lines inspected for a header signature.
pub const DETECTION_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    Generic,
    Lightspeed,
    Thinkorswim,
    Tradingview,
    Schwab,
    SchwabTransactions,
    Ibkr,
    IbkrTradeConfirmation,
    Etrade,
    Papermoney,
    Projectx,
}

impl FormatTag {
    pub const ALL: [FormatTag; 11] = [
        FormatTag::Generic,
        FormatTag::Lightspeed,
        FormatTag::Thinkorswim,
        FormatTag::Tradingview,
        FormatTag::Schwab,
        FormatTag::SchwabTransactions,
        FormatTag::Ibkr,
        FormatTag::IbkrTradeConfirmation,
        FormatTag::Etrade,
        FormatTag::Papermoney,
        FormatTag::Projectx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatTag::Generic => "generic",
            FormatTag::Lightspeed => "lightspeed",
            FormatTag::Thinkorswim => "thinkorswim",
            FormatTag::Tradingview => "tradingview",
            FormatTag::Schwab => "schwab",
            FormatTag::SchwabTransactions => "schwab_transactions",
            FormatTag::Ibkr => "ibkr",
            FormatTag::IbkrTradeConfirmation => "ibkr_trade_confirmation",
            FormatTag::Etrade => "etrade",
            FormatTag::Papermoney => "papermoney",
            FormatTag::Projectx => "projectx",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown format '{0}'")]
pub struct UnknownFormat(pub String);

impl FromStr for FormatTag {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        FormatTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == wanted)
            .ok_or(UnknownFormat(s.to_string()))
    }
}

const PAPERMONEY_MARKERS: &[&str] = &[
    "filled orders",
    "working orders",
    "canceled orders",
    "cancelled orders",
];

struct Signature {
    tokens: HashSet<String>,
    line: String,
}

impl Signature {
    fn new(line: &str) -> Self {
        let tokens = line
            .split([',', '\t', ';'])
            .map(|t| t.trim().trim_matches('"').trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Signature {
            tokens,
            line: line.trim().trim_matches(',').trim().to_lowercase(),
        }
    }

    fn has(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    fn all(&self, tokens: &[&str]) -> bool {
        tokens.iter().all(|t| self.has(t))
    }

    fn any(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|t| self.has(t))
    }
}

fn ibkr_trade_confirmation(s: &Signature) -> bool {
    s.all(&["underlyingsymbol", "strike", "expiry", "put/call", "multiplier", "buy/sell"])
}

fn thinkorswim(s: &Signature) -> bool {
    s.all(&["ref #", "description", "date", "time", "type"])
}

fn papermoney(s: &Signature) -> bool {
    PAPERMONEY_MARKERS.contains(&s.line.as_str()) || s.all(&["exec time", "spread", "pos effect"])
}

fn lightspeed(s: &Signature) -> bool {
    s.has("trade number") && s.any(&["commission amount", "execution time"])
}

fn projectx(s: &Signature) -> bool {
    s.all(&["contractname", "enteredat", "exitedat"])
}

fn tradingview(s: &Signature) -> bool {
    s.all(&["fill price", "status"]) && s.any(&["placing time", "closing time"])
}

fn schwab(s: &Signature) -> bool {
    s.any(&["gain/loss ($)", "gain/loss"]) && s.all(&["cost per share", "proceeds per share"])
}

fn schwab_transactions(s: &Signature) -> bool {
    s.all(&["action", "fees & comm"])
}

fn etrade(s: &Signature) -> bool {
    s.all(&["transaction date", "transaction type", "security type"])
        || s.all(&["transactiondate", "transactiontype", "securitytype"])
}

fn ibkr(s: &Signature) -> bool {
    s.has("date/time") && s.any(&["t. price", "comm/fee"])
}

/// Rules in priority order; the first match on any scanned line wins.
const RULES: &[(FormatTag, fn(&Signature) -> bool)] = &[
    (FormatTag::IbkrTradeConfirmation, ibkr_trade_confirmation),
    (FormatTag::Thinkorswim, thinkorswim),
    (FormatTag::Papermoney, papermoney),
    (FormatTag::Lightspeed, lightspeed),
    (FormatTag::Projectx, projectx),
    (FormatTag::Tradingview, tradingview),
    (FormatTag::Schwab, schwab),
    (FormatTag::SchwabTransactions, schwab_transactions),
    (FormatTag::Etrade, etrade),
    (FormatTag::Ibkr, ibkr),
];

/// Picks a format from raw file bytes. Never fails; unknown layouts are `Generic`.
pub fn detect(bytes: &[u8]) -> FormatTag {
    detect_text(&String::from_utf8_lossy(bytes))
}

pub fn detect_text(text: &str) -> FormatTag {
    let signatures: Vec<Signature> = text
        .lines()
        .filter(|l| !l.trim().trim_matches(',').trim().is_empty())
        .take(DETECTION_LINES)
        .map(Signature::new)
        .collect();

    RULES
        .iter()
        .find(|(_, rule)| signatures.iter().any(|s| rule(s)))
        .map(|(tag, _)| *tag)
        .unwrap_or(FormatTag::Generic)
}
