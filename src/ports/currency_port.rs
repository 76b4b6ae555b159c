//! Currency rate port.

use chrono::NaiveDate;

use crate::domain::error::ImportError;

pub trait CurrencyPort {
    /// USD value of one unit of `currency` on `as_of`.
    fn usd_rate(&self, currency: &str, as_of: NaiveDate) -> Result<f64, ImportError>;
}
