//! Time-gap trade grouping.
//!
//! Per symbol, trades are visited in entry-time order and folded into a
//! running group while they share the group's side and enter within the
//! configured gap of the group's latest entry. Open trades and updates
//! pass through untouched.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::trade::{Trade, percent_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingPolicy {
    pub enabled: bool,
    pub time_gap_minutes: i64,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        GroupingPolicy {
            enabled: false,
            time_gap_minutes: 60,
        }
    }
}

struct Group {
    trade: Trade,
    latest_entry: DateTime<Utc>,
}

/// Merges near-in-time same-direction trades. A disabled policy returns the input unchanged.
pub fn group_trades(trades: Vec<Trade>, policy: &GroupingPolicy) -> Vec<Trade> {
    if !policy.enabled {
        return trades;
    }
    let gap = Duration::minutes(policy.time_gap_minutes);

    let mut by_symbol: BTreeMap<String, Vec<Trade>> = BTreeMap::new();
    for trade in trades {
        by_symbol.entry(trade.symbol.clone()).or_default().push(trade);
    }

    let mut out = Vec::new();
    for (_, mut symbol_trades) in by_symbol {
        symbol_trades.sort_by_key(|t| t.entry_time);
        let mut group: Option<Group> = None;

        for trade in symbol_trades {
            // Updates belong to records the caller already owns.
            if trade.is_update() {
                out.push(trade);
                continue;
            }
            // An open trade must stay a single reseedable position.
            if trade.is_open() {
                if let Some(done) = group.take() {
                    out.push(done.trade);
                }
                out.push(trade);
                continue;
            }
            match group.as_mut() {
                Some(g)
                    if g.trade.side == trade.side
                        && trade.entry_time - g.latest_entry <= gap =>
                {
                    g.latest_entry = g.latest_entry.max(trade.entry_time);
                    merge_into(&mut g.trade, trade);
                }
                _ => {
                    if let Some(done) = group.take() {
                        out.push(done.trade);
                    }
                    group = Some(Group {
                        latest_entry: trade.entry_time,
                        trade,
                    });
                }
            }
        }
        if let Some(done) = group {
            out.push(done.trade);
        }
    }

    out.sort_by(|a, b| {
        a.entry_time
            .cmp(&b.entry_time)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    out
}

fn weighted(a: f64, a_qty: u64, b: f64, b_qty: u64) -> f64 {
    let total = (a_qty + b_qty) as f64;
    if total == 0.0 {
        return a;
    }
    (a * a_qty as f64 + b * b_qty as f64) / total
}

fn merge_into(group: &mut Trade, trade: Trade) {
    let (gq, tq) = (group.quantity, trade.quantity);
    group.entry_price = weighted(group.entry_price, gq, trade.entry_price, tq);
    group.exit_price = match (group.exit_price, trade.exit_price) {
        (Some(a), Some(b)) => Some(weighted(a, gq, b, tq)),
        _ => None,
    };
    group.quantity = gq + tq;
    group.entry_value += trade.entry_value;
    group.exit_value += trade.exit_value;
    group.fees += trade.fees;
    group.entry_time = group.entry_time.min(trade.entry_time);

    if group.exit_price.is_some() {
        group.exit_time = match (group.exit_time, trade.exit_time) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let pnl = group.pnl.unwrap_or(0.0) + trade.pnl.unwrap_or(0.0);
        group.pnl = Some(pnl);
        group.pnl_percent = Some(percent_of(pnl, group.entry_value));
    } else {
        group.exit_time = None;
        group.pnl = None;
        group.pnl_percent = None;
    }

    group.executions.extend(trade.executions);
    group.executions.sort_by_key(|e| e.timestamp);
    group.group_count += trade.group_count;
}
