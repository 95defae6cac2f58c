//! Ranks of one universe under several ranking systems, one column per
//! iteration. [`RankMatrix`] is shared with the rank-over-time operation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::iteration::{IterationStrategy, Step};
use super::response::array;
use super::RunContext;
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column, Row, PREVIEW_ROWS};
use crate::params::Params;

// =============================================================================
// Rank matrix
// =============================================================================

/// Securities in order of first appearance, with one rank slot per column.
#[derive(Debug, Default)]
pub struct RankMatrix {
    include_names: bool,
    slots: usize,
    rows: Vec<(Row, Vec<Cell>)>,
    index: HashMap<String, usize>,
}

impl RankMatrix {
    pub fn new(slots: usize, include_names: bool) -> Self {
        Self {
            include_names,
            slots,
            ..Default::default()
        }
    }

    /// Record the ranks of one `/rank/ranks` response in column `slot`.
    pub fn absorb(&mut self, json: &Value, slot: usize) -> OperationResult<()> {
        let uids = array(json, "p123Uids")?;
        let tickers = array(json, "tickers")?;
        let ranks = array(json, "ranks")?;
        let names = if self.include_names { Some(array(json, "names")?) } else { None };

        for (idx, uid) in uids.iter().enumerate() {
            let key = uid.to_string();
            let pos = match self.index.get(&key) {
                Some(pos) => *pos,
                None => {
                    let mut ident = vec![Cell::from(uid), Cell::from(entry(tickers, idx, "tickers")?)];
                    if let Some(names) = names {
                        ident.push(Cell::from(entry(names, idx, "names")?));
                    }
                    self.rows.push((ident, vec![Cell::Na; self.slots]));
                    self.index.insert(key, self.rows.len() - 1);
                    self.rows.len() - 1
                }
            };
            self.rows[pos].1[slot] = Cell::from(entry(ranks, idx, "ranks")?);
        }
        Ok(())
    }

    /// "P123 UID", "Ticker" and optionally "Name", sized by the first rows.
    pub fn identity_columns(&self) -> Vec<Column> {
        let widest = |col: usize| {
            self.rows
                .iter()
                .take(PREVIEW_ROWS)
                .filter_map(|(ident, _)| ident.get(col))
                .map(Cell::width)
                .max()
                .unwrap_or(0)
        };
        let mut columns = vec![Column::left("P123 UID", 10), Column::left("Ticker", widest(1))];
        if self.include_names {
            columns.push(Column::left("Name", widest(2)));
        }
        columns
    }

    pub fn into_rows(self) -> impl Iterator<Item = Row> {
        self.rows.into_iter().map(|(mut ident, ranks)| {
            ident.extend(ranks);
            ident
        })
    }
}

fn entry<'a>(values: &'a [Value], idx: usize, key: &str) -> OperationResult<&'a Value> {
    values
        .get(idx)
        .ok_or_else(|| OperationError::Malformed(format!("\"{}\" is shorter than \"p123Uids\"", key)))
}

// =============================================================================
// Strategy
// =============================================================================

pub struct RanksMulti {
    matrix: Option<RankMatrix>,
}

impl RanksMulti {
    pub fn new(ctx: &mut RunContext) -> Self {
        let include_names = ctx.document.settings.flag("Include Names");
        Self {
            matrix: Some(RankMatrix::new(ctx.iteration_count(), include_names)),
        }
    }

    /// Column name of iteration `idx`: its name, else a named ranking system.
    fn column_name(ctx: &RunContext, idx: usize) -> String {
        let iteration = &ctx.document.iterations[idx];
        iteration
            .str("Name")
            .or_else(|| iteration.str("Ranking System"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Iteration {}", idx + 1))
    }
}

#[async_trait]
impl IterationStrategy for RanksMulti {
    async fn run_iteration(&mut self, ctx: &mut RunContext, idx: usize, params: Params) -> OperationResult<Step> {
        let json = match ctx.submit(Request::RankRanks, &params).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                ctx.log_iteration(idx, false);
                return Ok(Step::Failed);
            }
        };
        if let Some(matrix) = self.matrix.as_mut() {
            matrix.absorb(&json, idx)?;
        }
        ctx.log_iteration(idx, true);
        Ok(Step::Done)
    }

    fn finish(&mut self, ctx: &mut RunContext, completed: usize) -> OperationResult<()> {
        if completed == 0 {
            return Ok(());
        }
        let Some(matrix) = self.matrix.take() else {
            return Ok(());
        };
        let mut columns = matrix.identity_columns();
        columns.extend((0..ctx.iteration_count()).map(|idx| Column::right(Self::column_name(ctx, idx))));

        ctx.begin_table(&columns);
        for row in matrix.into_rows() {
            ctx.emit(row);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::client::mock::ScriptedClient;
    use crate::operation::RunStatus;
    use serde_json::json;

    fn doc(on_error: &str) -> Value {
        json!({
            "Main": {"Operation": "RanksMulti", "On Error": on_error},
            "Default Settings": {"Universe": "SP500", "As of Date": "2021-03-05", "Include Names": true},
            "Iterations": [
                {"Ranking System": "Core: Value", "Name": "Value"},
                {"Ranking System": "Core: Growth"},
                {"Ranking System": {"Formula": "Sales", "Lower is Better": false}}
            ]
        })
    }

    #[test]
    fn test_matrix_keeps_first_appearance_order() {
        let mut matrix = RankMatrix::new(2, false);
        matrix
            .absorb(&json!({"p123Uids": [1, 2], "tickers": ["A", "BB"], "ranks": [90.5, 10]}), 0)
            .unwrap();
        matrix
            .absorb(&json!({"p123Uids": [3, 1], "tickers": ["CCCC", "A"], "ranks": [50, 80]}), 1)
            .unwrap();

        let columns = matrix.identity_columns();
        assert_eq!(columns[1].length, Some(4));
        let rows: Vec<Vec<String>> = matrix.into_rows().map(|r| text(&r)).collect();
        assert_eq!(rows, vec![vec!["1", "A", "90.50", "80"], vec!["2", "BB", "10", "NA"], vec!["3", "CCCC", "NA", "50"]]);
    }

    #[test]
    fn test_matrix_rejects_short_arrays() {
        let mut matrix = RankMatrix::new(1, true);
        let json = json!({"p123Uids": [1], "tickers": ["A"], "ranks": [1], "names": []});
        assert!(matches!(matrix.absorb(&json, 0), Err(OperationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_one_column_per_ranking_system() {
        let response = |rank: i64| {
            json!({"p123Uids": [10, 20], "tickers": ["AAA", "BBB"], "names": ["Alpha", "Beta"], "ranks": [rank, rank + 1]})
        };
        let client = ScriptedClient::new()
            .respond(Request::RankRanks, response(1))
            .respond(Request::RankRanks, response(5))
            .respond(Request::RankRanks, response(9));
        let harness = Harness::new(client);
        let op = harness.run(&doc("stop")).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        let rows = op.get_result().rows();
        assert_eq!(text(&rows[0]), vec!["P123 UID", "Ticker", "Name", "Value", "Core: Growth", "Iteration 3"]);
        assert_eq!(text(&rows[2]), vec!["20", "BBB", "Beta", "2", "6", "10"]);

        let sent = harness.client.calls_of(Request::RankRanks);
        assert_eq!(sent[0]["rankingSystem"], "Core: Value");
        assert_eq!(sent[2]["rankingSystem"], "ApiRankingSystem");
        assert_eq!(sent[1]["asOfDt"], "2021-03-05");
    }

    #[tokio::test]
    async fn test_failed_iteration_leaves_na_column() {
        let client = ScriptedClient::new()
            .respond(Request::RankRanks, json!({"p123Uids": [10], "tickers": ["AAA"], "names": ["Alpha"], "ranks": [3]}))
            .fail(Request::RankRanks, "unknown ranking system")
            .respond(Request::RankRanks, json!({"p123Uids": [10], "tickers": ["AAA"], "names": ["Alpha"], "ranks": [7]}));
        let harness = Harness::new(client);
        let op = harness.run(&doc("continue")).await;

        let rows = op.get_result().rows();
        assert_eq!(text(&rows[1]), vec!["10", "AAA", "Alpha", "3", "NA", "7"]);
        assert!(harness.logs.contains("API request failed: unknown ranking system"));
    }
}
