//! Configuration validation and import settings.
//!
//! Validates every `[import]` and `[grouping]` value before an import runs.

use chrono::FixedOffset;

use crate::domain::error::ImportError;
use crate::domain::format::FormatTag;
use crate::domain::grouping::GroupingPolicy;
use crate::domain::import::ImportContext;
use crate::domain::parsers::ColumnMapping;
use crate::ports::config_port::ConfigPort;

/// Largest broker clock offset accepted, in minutes.
pub const MAX_OFFSET_MINUTES: i64 = 1439;

pub fn validate_import_config(config: &dyn ConfigPort) -> Result<(), ImportError> {
    validate_format(config)?;
    validate_utc_offset(config)?;
    validate_grouping(config)?;
    validate_columns(config)?;
    validate_currency_rates(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ImportError {
    ImportError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_format(config: &dyn ConfigPort) -> Result<(), ImportError> {
    format_override(config).map(|_| ())
}

fn validate_utc_offset(config: &dyn ConfigPort) -> Result<(), ImportError> {
    utc_offset(config).map(|_| ())
}

fn validate_grouping(config: &dyn ConfigPort) -> Result<(), ImportError> {
    let enabled = config.get_bool("grouping", "enabled", false);
    let gap = config.get_int("grouping", "time_gap_minutes", 60);
    if enabled && gap <= 0 {
        return Err(invalid(
            "grouping",
            "time_gap_minutes",
            "time_gap_minutes must be positive when grouping is enabled",
        ));
    }
    Ok(())
}

fn validate_columns(config: &dyn ConfigPort) -> Result<(), ImportError> {
    let Some(mapping) = column_mapping(config) else {
        return Ok(());
    };
    for (key, value) in [
        ("symbol", &mapping.symbol),
        ("quantity", &mapping.quantity),
        ("price", &mapping.price),
        ("date", &mapping.date),
    ] {
        if value.is_none() {
            return Err(invalid(
                "columns",
                key,
                format!("custom column mapping must name the {key} column"),
            ));
        }
    }
    Ok(())
}

fn validate_currency_rates(config: &dyn ConfigPort) -> Result<(), ImportError> {
    for currency in config.keys("currency_rates") {
        let rate = config.get_double("currency_rates", &currency, f64::NAN);
        if !rate.is_finite() || rate <= 0.0 {
            return Err(invalid(
                "currency_rates",
                &currency,
                "rate must be a positive number",
            ));
        }
    }
    Ok(())
}

/// `None` for `auto` or an absent key.
pub fn format_override(config: &dyn ConfigPort) -> Result<Option<FormatTag>, ImportError> {
    match config.get_string("import", "format") {
        None => Ok(None),
        Some(value) if value.trim().eq_ignore_ascii_case("auto") => Ok(None),
        Some(value) => value
            .parse::<FormatTag>()
            .map(Some)
            .map_err(|e| invalid("import", "format", e.to_string())),
    }
}

pub fn utc_offset(config: &dyn ConfigPort) -> Result<FixedOffset, ImportError> {
    let minutes = config.get_int("import", "utc_offset_minutes", 0);
    if minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(invalid(
            "import",
            "utc_offset_minutes",
            format!("utc_offset_minutes must be within ±{MAX_OFFSET_MINUTES}"),
        ));
    }
    FixedOffset::east_opt(minutes as i32 * 60)
        .ok_or_else(|| invalid("import", "utc_offset_minutes", "offset out of range"))
}

pub fn grouping_policy(config: &dyn ConfigPort) -> GroupingPolicy {
    let defaults = GroupingPolicy::default();
    GroupingPolicy {
        enabled: config.get_bool("grouping", "enabled", defaults.enabled),
        time_gap_minutes: config.get_int("grouping", "time_gap_minutes", defaults.time_gap_minutes),
    }
}

/// Custom generic-parser columns, when the `[columns]` section names any.
pub fn column_mapping(config: &dyn ConfigPort) -> Option<ColumnMapping> {
    let get = |key: &str| config.get_string("columns", key).map(|v| v.trim().to_string());
    let mapping = ColumnMapping {
        symbol: get("symbol"),
        side: get("side"),
        quantity: get("quantity"),
        price: get("price"),
        date: get("date"),
        time: get("time"),
        fees: get("fees"),
        commission: get("commission"),
        fill_id: get("fill_id"),
        currency: get("currency"),
    };
    (mapping != ColumnMapping::default()).then_some(mapping)
}

/// Validated settings as an import context without prior positions or history.
pub fn import_context(config: &dyn ConfigPort) -> Result<ImportContext, ImportError> {
    validate_import_config(config)?;
    Ok(ImportContext {
        mapping: column_mapping(config),
        grouping: grouping_policy(config),
        format: format_override(config)?,
        utc_offset: utc_offset(config)?,
        currency_conversion: config.get_bool("import", "currency_conversion", false),
        user_id: config.get_string("import", "user_id"),
        ..Default::default()
    })
}
