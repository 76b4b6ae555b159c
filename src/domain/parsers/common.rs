//! Shared helpers for the broker row parsers: header lookup, number and
//! date parsing, and record splitting.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::domain::error::{ImportError, SkipReason};
use crate::domain::instrument::month_from_abbrev;
use crate::domain::trade::Trade;
use crate::domain::transaction::Transaction;

use super::generic::ColumnMapping;

/// Inputs every row parser needs besides the row itself.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Offset of the broker's wall clock from UTC.
    pub utc_offset: FixedOffset,
    /// Anchors two-digit years and the plausible date window.
    pub reference_year: i32,
    pub mapping: Option<ColumnMapping>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            utc_offset: Utc.fix(),
            reference_year: Utc::now().year(),
            mapping: None,
        }
    }
}

/// Result of mapping one raw row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Fill(Transaction),
    /// Formats that export completed round trips bypass position tracking.
    RoundTrip(Trade),
    Skip(SkipReason),
}

impl From<Result<RowOutcome, SkipReason>> for RowOutcome {
    fn from(result: Result<RowOutcome, SkipReason>) -> Self {
        result.unwrap_or_else(RowOutcome::Skip)
    }
}

/// Case-insensitive column lookup for one header row.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    columns: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new<S: AsRef<str>>(cols: &[S]) -> Self {
        let mut columns = HashMap::new();
        for (i, c) in cols.iter().enumerate() {
            let key = normalize_header(c.as_ref());
            if !key.is_empty() {
                columns.entry(key).or_insert(i);
            }
        }
        Self { columns }
    }

    pub fn has(&self, name: &str) -> bool {
        self.columns.contains_key(&normalize_header(name))
    }

    pub fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|n| self.has(n))
    }

    pub fn position(&self, names: &[&str]) -> Option<usize> {
        names
            .iter()
            .find_map(|n| self.columns.get(&normalize_header(n)).copied())
    }

    /// First non-empty value among the candidate column names.
    pub fn get<'a>(&self, row: &'a [String], names: &[&str]) -> Option<&'a str> {
        names.iter().find_map(|n| {
            let i = *self.columns.get(&normalize_header(n))?;
            row.get(i).map(|s| s.trim()).filter(|s| !s.is_empty())
        })
    }
}

pub fn normalize_header(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
}

/// A header row plus the data rows that follow it.
#[derive(Debug, Clone)]
pub struct Table {
    pub header: HeaderIndex,
    pub rows: Vec<Vec<String>>,
}

/// Splits text into trimmed records, tolerating ragged rows.
pub fn read_records(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        records.push(row);
    }
    Ok(records)
}

/// Finds the first record satisfying `is_header` and returns it with everything after it.
pub fn table_after_header(
    records: Vec<Vec<String>>,
    format: &str,
    is_header: impl Fn(&HeaderIndex) -> bool,
) -> Result<Table, ImportError> {
    let mut iter = records.into_iter();
    for record in iter.by_ref() {
        let header = HeaderIndex::new(&record);
        if is_header(&header) {
            return Ok(Table {
                header,
                rows: iter.collect(),
            });
        }
    }
    Err(ImportError::MissingHeader {
        format: format.to_string(),
    })
}

/// Parses broker-formatted numbers: `$1,234.50`, `(12.00)`, `+100`, `-3`.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '+' | '%'))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value.abs() } else { value })
}

pub fn required_text<'a>(
    header: &HeaderIndex,
    row: &'a [String],
    names: &[&str],
    field: &'static str,
) -> Result<&'a str, SkipReason> {
    header
        .get(row, names)
        .ok_or(SkipReason::MissingField(field))
}

pub fn required_number(
    header: &HeaderIndex,
    row: &[String],
    names: &[&str],
    field: &'static str,
) -> Result<f64, SkipReason> {
    let raw = required_text(header, row, names, field)?;
    parse_number(raw).ok_or_else(|| SkipReason::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

/// Empty cells are `None`; unparseable cells are an error.
pub fn optional_number(
    header: &HeaderIndex,
    row: &[String],
    names: &[&str],
    field: &'static str,
) -> Result<Option<f64>, SkipReason> {
    match header.get(row, names) {
        None => Ok(None),
        Some(raw) => parse_number(raw)
            .map(Some)
            .ok_or_else(|| SkipReason::InvalidNumber {
                field,
                value: raw.to_string(),
            }),
    }
}

/// Sum of every present fee column, as a non-negative total.
pub fn sum_fees(
    header: &HeaderIndex,
    row: &[String],
    columns: &[&str],
) -> Result<f64, SkipReason> {
    let mut total = 0.0;
    for column in columns {
        if let Some(value) = optional_number(header, row, &[*column], "fees")? {
            total += value.abs();
        }
    }
    Ok(total)
}

/// Whole-unit quantity magnitude.
pub fn to_quantity(value: f64) -> Result<u64, SkipReason> {
    let magnitude = value.abs().round();
    if magnitude < 1.0 {
        return Err(SkipReason::ZeroQuantity);
    }
    Ok(magnitude as u64)
}

/// Century for a two-digit year: the latest year not more than one year past the reference.
pub fn expand_two_digit_year(yy: i32, reference_year: i32) -> i32 {
    let century = reference_year - reference_year.rem_euclid(100);
    let candidate = century + yy;
    if candidate > reference_year + 1 {
        candidate - 100
    } else if candidate + 100 <= reference_year + 1 {
        candidate + 100
    } else {
        candidate
    }
}

static SHORT_YEAR_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{1,2})/(\d{1,2})/(\d{2})(?:[\s,]+(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(AM|PM|am|pm)?)?$",
    )
    .expect("valid regex")
});

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S %:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%m/%d/%Y %H:%M:%S %:z",
    "%m/%d/%Y %H:%M:%S%.f %:z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d, %H:%M:%S",
    "%Y-%m-%d,%H:%M:%S",
    "%Y%m%d;%H%M%S",
    "%Y%m%d %H%M%S",
    "%Y%m%d;%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%d-%b-%Y", "%Y/%m/%d"];

/// Resolves a broker timestamp into UTC.
///
/// Explicit offsets are honored; naive wall-clock values use the configured
/// broker offset. Dates outside 1970..=reference_year+1 are rejected.
pub fn parse_timestamp(text: &str, opts: &ParseOptions) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let resolved = if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        Some(dt.with_timezone(&Utc))
    } else if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(text, f).ok())
    {
        Some(dt.with_timezone(&Utc))
    } else {
        parse_naive(text, opts.reference_year).and_then(|naive| localize(naive, opts))
    };

    resolved.filter(|dt| plausible(dt.year(), opts.reference_year))
}

/// Joins separate date and time cells; a missing time means midnight.
pub fn parse_date_time(date: &str, time: Option<&str>, opts: &ParseOptions) -> Option<DateTime<Utc>> {
    match time.map(str::trim).filter(|t| !t.is_empty()) {
        Some(time) => parse_timestamp(&format!("{} {}", date.trim(), time), opts),
        None => parse_timestamp(date, opts),
    }
}

pub fn parse_day(text: &str, reference_year: i32) -> Option<NaiveDate> {
    parse_naive(text, reference_year).map(|dt| dt.date())
}

/// Option expirations spelled as `19 SEP 25` or `19 SEP 2025`.
pub fn spelled_expiration(text: &str, reference_year: i32) -> Option<NaiveDate> {
    let mut parts = text.split_whitespace();
    let day: u32 = parts.next()?.parse().ok()?;
    let month = month_from_abbrev(parts.next()?)?;
    let year_text = parts.next()?;
    let year: i32 = year_text.parse().ok()?;
    let year = if year_text.len() <= 2 {
        expand_two_digit_year(year, reference_year)
    } else {
        year
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_naive(text: &str, reference_year: i32) -> Option<NaiveDateTime> {
    // Brokers append notes such as "01/15/2024 as of 01/12/2024".
    let text = text.split(" as of ").next().unwrap_or(text).trim();

    if let Some(caps) = SHORT_YEAR_DATE.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = expand_two_digit_year(caps[3].parse().ok()?, reference_year);
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = match caps.get(4) {
            Some(h) => {
                let mut hour: u32 = h.as_str().parse().ok()?;
                let minute: u32 = caps[5].parse().ok()?;
                let second: u32 = caps.get(6).map_or(Some(0), |s| s.as_str().parse().ok())?;
                match caps.get(7).map(|m| m.as_str().to_ascii_uppercase()).as_deref() {
                    Some("PM") if hour < 12 => hour += 12,
                    Some("AM") if hour == 12 => hour = 0,
                    _ => {}
                }
                NaiveTime::from_hms_opt(hour, minute, second)?
            }
            None => NaiveTime::MIN,
        };
        return Some(date.and_time(time));
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn localize(naive: NaiveDateTime, opts: &ParseOptions) -> Option<DateTime<Utc>> {
    opts.utc_offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn plausible(year: i32, reference_year: i32) -> bool {
    (1970..=reference_year + 1).contains(&year)
}
