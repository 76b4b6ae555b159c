//! JSON files for the caller's prior state and the import output.
//!
//! Positions are either a JSON object keyed by symbol (or underlying, for
//! option seeds) or a plain array, which is keyed by each seed's symbol.
//! The array may also be a previous `import` output: its open trades become
//! seeds and its closed trades are ignored.
//! History is an array of executions or of previously output trades.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::duplicate::ExecutionHistory;
use crate::domain::error::ImportError;
use crate::domain::trade::{SeedPosition, Trade, TradeOrigin};
use crate::domain::transaction::Transaction;

#[derive(Deserialize)]
#[serde(untagged)]
enum PositionsFile {
    Keyed(HashMap<String, SeedPosition>),
    Listed(Vec<PositionEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PositionEntry {
    Seed(SeedPosition),
    Trade(Box<Trade>),
}

impl PositionEntry {
    fn into_seed(self) -> Option<SeedPosition> {
        match self {
            PositionEntry::Seed(seed) => Some(seed),
            PositionEntry::Trade(trade) => {
                let trade_id = match &trade.origin {
                    TradeOrigin::Update { trade_id } => trade_id.clone(),
                    TradeOrigin::New => format!("{}@{}", trade.symbol, trade.entry_time.to_rfc3339()),
                };
                SeedPosition::from_open_trade(trade_id, &trade)
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryEntry {
    Trade(Box<Trade>),
    Execution(Transaction),
}

pub struct JsonStateAdapter {
    base_path: PathBuf,
}

impl JsonStateAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn read(&self, path: &Path) -> Result<String, ImportError> {
        let path = self.resolve(path);
        fs::read_to_string(&path).map_err(|e| {
            ImportError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            ))
        })
    }

    pub fn load_positions(&self, path: &Path) -> Result<HashMap<String, SeedPosition>, ImportError> {
        let positions = parse_positions(&self.read(path)?)?;
        debug!(count = positions.len(), path = %path.display(), "loaded open positions");
        Ok(positions)
    }

    pub fn load_history(&self, path: &Path) -> Result<ExecutionHistory, ImportError> {
        let history = parse_history(&self.read(path)?)?;
        debug!(executions = history.len(), path = %path.display(), "loaded execution history");
        Ok(history)
    }

    /// Writes `trades` as pretty JSON to `path`, or to `out` when there is no path.
    pub fn write_trades(
        &self,
        trades: &[Trade],
        path: Option<&Path>,
        out: &mut dyn Write,
    ) -> Result<(), ImportError> {
        let json = serde_json::to_string_pretty(trades)?;
        match path {
            Some(path) => fs::write(self.resolve(path), json + "\n")?,
            None => writeln!(out, "{json}")?,
        }
        Ok(())
    }
}

pub fn parse_positions(json: &str) -> Result<HashMap<String, SeedPosition>, ImportError> {
    let list = match serde_json::from_str::<PositionsFile>(json)? {
        PositionsFile::Keyed(map) => return Ok(map),
        PositionsFile::Listed(list) => list,
    };
    let mut positions = HashMap::new();
    for seed in list.into_iter().filter_map(PositionEntry::into_seed) {
        if let Some(replaced) = positions.insert(seed.symbol.clone(), seed) {
            warn!(symbol = %replaced.symbol, trade_id = %replaced.trade_id, "more than one open position for symbol; keeping the last");
        }
    }
    Ok(positions)
}

pub fn parse_history(json: &str) -> Result<ExecutionHistory, ImportError> {
    let entries: Vec<HistoryEntry> = serde_json::from_str(json)?;
    let mut history = ExecutionHistory::new();
    for entry in entries {
        match entry {
            HistoryEntry::Trade(trade) => history.record_trades([trade.as_ref()]),
            HistoryEntry::Execution(execution) => history.record(execution),
        }
    }
    Ok(history)
}
