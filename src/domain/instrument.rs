//! Instrument classification from symbol text.
//!
//! Patterns are tried in priority order: human-readable option, IBKR padded
//! OCC code, compact OCC code, dated futures contract, exchange-prefixed
//! continuous futures. Anything else is a stock.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const OPTION_MULTIPLIER: f64 = 100.0;
pub const DEFAULT_FUTURES_POINT_VALUE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Stock,
    Option,
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn parse(text: &str) -> Option<OptionType> {
        match text.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(OptionType::Call),
            "P" | "PUT" => Some(OptionType::Put),
            _ => None,
        }
    }

    pub fn as_word(&self) -> &'static str {
        match self {
            OptionType::Call => "CALL",
            OptionType::Put => "PUT",
        }
    }
}

/// Instrument type plus the economics needed to turn price into notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_type: InstrumentType,
    pub underlying: Option<String>,
    pub strike: Option<f64>,
    pub expiration: Option<NaiveDate>,
    pub option_type: Option<OptionType>,
    pub contract_month: Option<u32>,
    pub contract_year: Option<i32>,
    /// Notional multiplier: 1 for stocks, 100 for options, point value for futures.
    pub multiplier: f64,
}

impl Instrument {
    pub fn stock() -> Self {
        Instrument {
            instrument_type: InstrumentType::Stock,
            underlying: None,
            strike: None,
            expiration: None,
            option_type: None,
            contract_month: None,
            contract_year: None,
            multiplier: 1.0,
        }
    }

    pub fn option(
        underlying: &str,
        expiration: NaiveDate,
        strike: f64,
        option_type: OptionType,
    ) -> Self {
        Instrument {
            instrument_type: InstrumentType::Option,
            underlying: Some(underlying.to_string()),
            strike: Some(strike),
            expiration: Some(expiration),
            option_type: Some(option_type),
            contract_month: None,
            contract_year: None,
            multiplier: OPTION_MULTIPLIER,
        }
    }

    pub fn future(root: &str, month: Option<u32>, year: Option<i32>) -> Self {
        Instrument {
            instrument_type: InstrumentType::Future,
            underlying: Some(root.to_string()),
            strike: None,
            expiration: None,
            option_type: None,
            contract_month: month,
            contract_year: year,
            multiplier: point_value(root),
        }
    }

    pub fn is_option(&self) -> bool {
        self.instrument_type == InstrumentType::Option
    }

    /// Identity of an option contract independent of how a broker spells it.
    pub fn contract_key(&self) -> Option<String> {
        if !self.is_option() {
            return None;
        }
        Some(format!(
            "{}|{}|{:.3}|{}",
            self.underlying.as_deref()?,
            self.expiration?,
            self.strike?,
            self.option_type?.as_word()
        ))
    }
}

const FUTURES_POINT_VALUES: &[(&str, f64)] = &[
    ("ES", 50.0),
    ("MES", 5.0),
    ("NQ", 20.0),
    ("MNQ", 2.0),
    ("YM", 5.0),
    ("MYM", 0.5),
    ("RTY", 50.0),
    ("M2K", 5.0),
    ("CL", 1000.0),
    ("MCL", 100.0),
    ("NG", 10000.0),
    ("GC", 100.0),
    ("MGC", 10.0),
    ("SI", 5000.0),
    ("HG", 25000.0),
    ("ZB", 1000.0),
    ("ZN", 1000.0),
    ("ZF", 1000.0),
    ("ZT", 2000.0),
    ("ZC", 50.0),
    ("ZS", 50.0),
    ("ZW", 50.0),
    ("6E", 125000.0),
    ("6J", 12500000.0),
];

/// Dollar value of one point for a futures root.
pub fn point_value(root: &str) -> f64 {
    let root = root.to_uppercase();
    FUTURES_POINT_VALUES
        .iter()
        .find(|(r, _)| *r == root)
        .map(|(_, v)| *v)
        .unwrap_or(DEFAULT_FUTURES_POINT_VALUE)
}

/// Futures month code letter to calendar month.
pub fn month_from_code(code: char) -> Option<u32> {
    let month = match code.to_ascii_uppercase() {
        'F' => 1,
        'G' => 2,
        'H' => 3,
        'J' => 4,
        'K' => 5,
        'M' => 6,
        'N' => 7,
        'Q' => 8,
        'U' => 9,
        'V' => 10,
        'X' => 11,
        'Z' => 12,
        _ => return None,
    };
    Some(month)
}

/// Three-letter month abbreviation to calendar month.
pub fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    let upper = abbrev.to_uppercase();
    MONTHS.iter().position(|m| *m == upper).map(|i| i as u32 + 1)
}

pub fn month_abbrev(month: u32) -> &'static str {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    MONTHS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("JAN")
}

/// Human-readable option symbol in the form the classifier's first pattern accepts.
pub fn readable_option_symbol(
    root: &str,
    expiration: NaiveDate,
    strike: f64,
    option_type: OptionType,
) -> String {
    format!(
        "{} {:02}{}{:02} {} {}",
        root.to_uppercase(),
        expiration.day(),
        month_abbrev(expiration.month()),
        expiration.year() % 100,
        format_strike(strike),
        option_type.as_word()
    )
}

fn format_strike(strike: f64) -> String {
    if strike.fract() == 0.0 {
        format!("{}", strike as i64)
    } else {
        let s = format!("{strike:.3}");
        s.trim_end_matches('0').to_string()
    }
}

static READABLE_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([A-Z][A-Z./]*)\s*(\d{1,2})\s*(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)\s*(\d{2})\s*(\d+(?:\.\d+)?)\s*(CALL|PUT|C|P)$",
    )
    .expect("valid regex")
});

static PADDED_OCC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9.]*)\s+(\d{6})([CP])(\d{8})$").expect("valid regex")
});

static COMPACT_OCC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9]{0,5}?)(\d{6})([CP])(\d{8})$").expect("valid regex")
});

static DATED_FUTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z0-9]{1,4}?)([FGHJKMNQUVXZ])(\d{4}|\d{1,2})$").expect("valid regex")
});

static CONTINUOUS_FUTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z0-9_]+):([A-Z0-9]+?)(\d+)!$").expect("valid regex")
});

/// Classifies a symbol; `reference_year` resolves single-digit futures years.
pub fn classify_as_of(symbol: &str, reference_year: i32) -> Instrument {
    let upper = symbol.trim().to_uppercase();

    if let Some(inst) = readable_option(&upper) {
        return inst;
    }
    if let Some(inst) = occ_option(&PADDED_OCC, &upper) {
        return inst;
    }
    if let Some(inst) = occ_option(&COMPACT_OCC, &upper) {
        return inst;
    }
    if let Some(inst) = dated_future(&upper, reference_year) {
        return inst;
    }
    if let Some(caps) = CONTINUOUS_FUTURE.captures(&upper) {
        return Instrument::future(&caps[2], None, None);
    }
    Instrument::stock()
}

fn readable_option(symbol: &str) -> Option<Instrument> {
    let caps = READABLE_OPTION.captures(symbol)?;
    let day: u32 = caps[2].parse().ok()?;
    let month = month_from_abbrev(&caps[3])?;
    let year = 2000 + caps[4].parse::<i32>().ok()?;
    let expiration = NaiveDate::from_ymd_opt(year, month, day)?;
    let strike: f64 = caps[5].parse().ok()?;
    let option_type = OptionType::parse(&caps[6])?;
    Some(Instrument::option(&caps[1], expiration, strike, option_type))
}

fn occ_option(pattern: &Regex, symbol: &str) -> Option<Instrument> {
    let caps = pattern.captures(symbol)?;
    let expiration = NaiveDate::parse_from_str(&format!("20{}", &caps[2]), "%Y%m%d").ok()?;
    let option_type = OptionType::parse(&caps[3])?;
    let strike = caps[4].parse::<u64>().ok()? as f64 / 1000.0;
    Some(Instrument::option(&caps[1], expiration, strike, option_type))
}

fn dated_future(symbol: &str, reference_year: i32) -> Option<Instrument> {
    let caps = DATED_FUTURE.captures(symbol)?;
    let root = &caps[1];
    let month = month_from_code(caps[2].chars().next()?)?;
    let digits = &caps[3];
    let value: i32 = digits.parse().ok()?;
    let year = match digits.len() {
        1 => reference_year - reference_year.rem_euclid(10) + value,
        2 if value < 50 => 2000 + value,
        2 => 1900 + value,
        _ => value,
    };
    Some(Instrument::future(root, Some(month), Some(year)))
}
