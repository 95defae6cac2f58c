//! Ranks of a universe on one date, optionally with node level ranks.

use async_trait::async_trait;
use serde_json::Value;

use super::response::{array, field};
use super::{Executor, Outcome, RunContext};
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column, Row, PREVIEW_ROWS};

/// Which node ranks accompany the overall rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankColumns {
    /// Overall rank only
    Ranks,
    /// Composite nodes
    Composite,
    /// Every factor and composite
    Factor,
}

impl RankColumns {
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("composite") => RankColumns::Composite,
            Some("factor") => RankColumns::Factor,
            _ => RankColumns::Ranks,
        }
    }

    /// Whether node `idx` of `node_type` gets a column. The root is never shown.
    fn shows(&self, idx: usize, node_type: i64) -> bool {
        match self {
            RankColumns::Ranks => false,
            RankColumns::Composite => idx > 0 && node_type == 0,
            RankColumns::Factor => idx > 0,
        }
    }
}

pub struct Ranks;

#[async_trait]
impl Executor for Ranks {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome> {
        let columns = RankColumns::from_setting(ctx.document.settings.str("Columns"));
        let include_names = ctx.document.settings.flag("Include Names");

        ctx.defaults.insert("includeNaCnt".to_string(), Value::Bool(true));
        ctx.defaults.insert("includeFinalStmt".to_string(), Value::Bool(true));
        if columns != RankColumns::Ranks {
            ctx.defaults.insert("includeNodeDetails".to_string(), Value::Bool(true));
        }

        let json = match ctx.submit(Request::RankRanks, &ctx.defaults).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                return Ok(Outcome::Failed);
            }
        };

        let (header, rows) = rank_table(&json, columns, include_names)?;
        ctx.begin_table(&header);
        for row in rows {
            ctx.emit(row);
        }
        Ok(Outcome::Success)
    }
}

/// Header and rows of a `/rank/ranks` response.
pub fn rank_table(json: &Value, columns: RankColumns, include_names: bool) -> OperationResult<(Vec<Column>, Vec<Row>)> {
    let uids = array(json, "p123Uids")?;
    let tickers = array(json, "tickers")?;
    let names = if include_names { Some(array(json, "names")?) } else { None };
    let na_counts = array(json, "naCnt")?;
    let final_stmts = array(json, "finalStmt")?;
    let ranks = array(json, "ranks")?;

    let widest = |values: &[Value]| {
        values
            .iter()
            .take(PREVIEW_ROWS)
            .map(|v| Cell::from(v).width())
            .max()
            .unwrap_or(0)
    };
    let mut header = vec![Column::left("P123 UID", 10), Column::left("Ticker", widest(tickers))];
    if let Some(names) = names {
        header.push(Column::left("Name", widest(names)));
    }
    header.extend(["#NAs", "Final Stmt", "100% rank"].into_iter().map(Column::right));

    let mut node_idxs = Vec::new();
    if columns != RankColumns::Ranks {
        let nodes = field(json, "nodes")?;
        let node_names = array(nodes, "names")?;
        let types = array(nodes, "types")?;
        let weights = array(nodes, "weights")?;
        let parents = array(nodes, "parents")?;
        for (idx, name) in node_names.iter().enumerate() {
            let node_type = types.get(idx).and_then(Value::as_i64).unwrap_or(-1);
            if !columns.shows(idx, node_type) {
                continue;
            }
            let label = |values: &[Value]| values.get(idx).map(|v| Cell::from(v).to_string()).unwrap_or_default();
            header.push(Column::right(format!(
                "{}% {} ({})",
                label(weights),
                Cell::from(name),
                label(parents)
            )));
            node_idxs.push(idx);
        }
    }
    let node_ranks = if node_idxs.is_empty() {
        None
    } else {
        Some(array(field(json, "nodes")?, "ranks")?)
    };

    let at = |values: &[Value], idx: usize| values.get(idx).map_or(Cell::Na, Cell::from);
    let mut rows = Vec::with_capacity(uids.len());
    for (idx, uid) in uids.iter().enumerate() {
        let mut row = vec![Cell::from(uid), at(tickers, idx)];
        if let Some(names) = names {
            row.push(at(names, idx));
        }
        let final_stmt = final_stmts.get(idx).and_then(Value::as_bool).unwrap_or(false);
        row.push(at(na_counts, idx));
        row.push(Cell::text(if final_stmt { "Y" } else { "N" }));
        row.push(at(ranks, idx));
        if let Some(node_ranks) = node_ranks {
            let security = node_ranks
                .get(idx)
                .and_then(Value::as_array)
                .ok_or_else(|| OperationError::Malformed(format!("no node ranks for row {}", idx)))?;
            row.extend(node_idxs.iter().map(|n| at(security, *n)));
        }
        rows.push(row);
    }
    Ok((header, rows))
}
