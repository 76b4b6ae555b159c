//! Identifier resolution from a fixed code table.

use std::collections::HashMap;

use crate::domain::error::ImportError;
use crate::ports::config_port::ConfigPort;
use crate::ports::identifier_port::IdentifierPort;

const SECTION: &str = "identifiers";

/// Resolves codes listed in the `[identifiers]` config table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentifierAdapter {
    table: HashMap<String, String>,
}

impl StaticIdentifierAdapter {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self {
            table: table
                .into_iter()
                .map(|(code, ticker)| (code.to_uppercase(), ticker.trim().to_uppercase()))
                .collect(),
        }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let table = config
            .keys(SECTION)
            .into_iter()
            .filter_map(|code| {
                let ticker = config.get_string(SECTION, &code)?;
                Some((code, ticker))
            })
            .collect();
        Self::new(table)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl IdentifierPort for StaticIdentifierAdapter {
    fn resolve(
        &self,
        codes: &[String],
        _user_id: Option<&str>,
    ) -> Result<HashMap<String, String>, ImportError> {
        Ok(codes
            .iter()
            .filter_map(|code| {
                let ticker = self.table.get(&code.to_uppercase())?;
                Some((code.clone(), ticker.clone()))
            })
            .collect())
    }
}
