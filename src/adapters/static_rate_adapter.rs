//! Currency rates from a fixed table.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::error::ImportError;
use crate::ports::config_port::ConfigPort;
use crate::ports::currency_port::CurrencyPort;

const SECTION: &str = "currency_rates";

/// One USD rate per currency regardless of date, read from `[currency_rates]`.
#[derive(Debug, Clone, Default)]
pub struct StaticRateAdapter {
    rates: HashMap<String, f64>,
}

impl StaticRateAdapter {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        Self {
            rates: rates
                .into_iter()
                .map(|(currency, rate)| (currency.trim().to_uppercase(), rate))
                .collect(),
        }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ImportError> {
        let mut rates = HashMap::new();
        for currency in config.keys(SECTION) {
            let rate = config.get_double(SECTION, &currency, f64::NAN);
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ImportError::ConfigInvalid {
                    section: SECTION.to_string(),
                    key: currency,
                    reason: "rate must be a positive number".to_string(),
                });
            }
            rates.insert(currency, rate);
        }
        Ok(Self::new(rates))
    }
}

impl CurrencyPort for StaticRateAdapter {
    fn usd_rate(&self, currency: &str, as_of: NaiveDate) -> Result<f64, ImportError> {
        let currency = currency.trim().to_uppercase();
        if currency == "USD" {
            return Ok(1.0);
        }
        self.rates
            .get(&currency)
            .copied()
            .ok_or_else(|| ImportError::CurrencyConversion {
                reason: format!("no rate configured for {as_of}"),
                currency,
            })
    }
}
