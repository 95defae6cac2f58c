//! Screen backtest: a stats block, the period results and the time series.

use async_trait::async_trait;
use serde_json::Value;

use super::response::{array, field};
use super::{Executor, Outcome, RunContext};
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column, Row};

/// Statistics shared by the screen and the benchmark rows.
const ITEM_STATS: [&str; 6] = [
    "total_return",
    "annualized_return",
    "max_drawdown",
    "sharpe_ratio",
    "sortino_ratio",
    "standard_dev",
];

/// Screen-versus-benchmark statistics.
const RELATIVE_STATS: [&str; 4] = ["correlation", "r_squared", "beta", "alpha"];

/// Chart series of the time series block, after the date.
const SERIES: [&str; 4] = ["screenReturns", "benchReturns", "turnoverPct", "positionCnt"];

pub struct ScreenBacktest;

#[async_trait]
impl Executor for ScreenBacktest {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome> {
        ctx.ensure_screen();
        let json = match ctx.submit(Request::Backtest, &ctx.defaults).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                return Ok(Outcome::Failed);
            }
        };

        ctx.emit_title("Stats");
        ctx.begin_table(&stats_columns());
        for row in stats_rows(&json)? {
            ctx.emit(row);
        }

        ctx.emit(Vec::new());
        ctx.emit_title("Results");
        let (columns, rows) = results(&json)?;
        ctx.begin_table(&columns);
        for row in rows {
            ctx.emit(row);
        }

        ctx.emit(Vec::new());
        ctx.emit_title("Time Series");
        ctx.begin_table(&series_columns());
        for row in series_rows(&json)? {
            ctx.emit(row);
        }
        Ok(Outcome::Success)
    }
}

fn stats_columns() -> Vec<Column> {
    let mut columns = vec![Column::left("", 8)];
    columns.extend(
        [
            "Tot Return",
            "Ann Return",
            "Max Dd",
            "Sharpe",
            "Sortino",
            "StdDev",
            "CorrelBench",
            "R-Squared",
            "Beta",
            "Alpha",
        ]
        .into_iter()
        .map(Column::right),
    );
    columns
}

/// The "Screen" and "Benchmark" rows.
pub fn stats_rows(json: &Value) -> OperationResult<Vec<Row>> {
    let stats = field(json, "stats")?;
    let item_row = |label: &str, item: &Value| -> Row {
        let mut row = vec![Cell::text(label)];
        row.extend(ITEM_STATS.iter().map(|key| item.get(*key).map_or(Cell::Na, Cell::from)));
        row
    };

    let mut screen = item_row("Screen", field(stats, "port")?);
    screen.extend(RELATIVE_STATS.iter().map(|key| stats.get(*key).map_or(Cell::Na, Cell::from)));
    let bench = item_row("Benchmark", field(stats, "bench")?);
    Ok(vec![screen, bench])
}

/// Results header and rows, followed by the three summary rows.
pub fn results(json: &Value) -> OperationResult<(Vec<Column>, Vec<Row>)> {
    let results = field(json, "results")?;
    let columns = array(results, "columns")?
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = Cell::from(name).to_string();
            match idx {
                0 => Column::left(name, 12),
                1..=3 => Column::left(name, 10),
                _ => Column::right(name),
            }
        })
        .collect();

    let to_row = |value: &Value| -> Row { value.as_array().map(|v| v.iter().map(Cell::from).collect()).unwrap_or_default() };
    let mut rows: Vec<Row> = array(results, "rows")?.iter().map(to_row).collect();
    for (key, label) in [("average", "Average"), ("upMarkets", "Up Markets"), ("downMarkets", "Down Markets")] {
        let mut row = to_row(field(results, key)?);
        match row.first_mut() {
            Some(first) => *first = Cell::text(label),
            None => row.push(Cell::text(label)),
        }
        rows.push(row);
    }
    Ok((columns, rows))
}

fn series_columns() -> Vec<Column> {
    let mut columns = vec![Column::left("Date", 10)];
    columns.extend(
        ["Screen Return %", "Benchmark Return %", "Turnover %", "# Positions"]
            .into_iter()
            .map(Column::right),
    );
    columns
}

/// One row per chart date.
pub fn series_rows(json: &Value) -> OperationResult<Vec<Row>> {
    let chart = field(json, "chart")?;
    let dates = array(chart, "dates")?;
    let series = SERIES
        .iter()
        .map(|key| array(chart, key))
        .collect::<OperationResult<Vec<_>>>()?;

    dates
        .iter()
        .enumerate()
        .map(|(idx, date)| {
            let mut row = vec![Cell::from(date)];
            for (key, values) in SERIES.iter().zip(&series) {
                let value = values
                    .get(idx)
                    .ok_or_else(|| OperationError::Malformed(format!("\"{}\" is shorter than \"dates\"", key)))?;
                row.push(Cell::from(value));
            }
            Ok(row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::client::mock::ScriptedClient;
    use crate::operation::RunStatus;
    use serde_json::json;

    fn response() -> Value {
        json!({
            "stats": {
                "port": {"total_return": 120.5, "annualized_return": 9.8, "max_drawdown": -35.1,
                         "sharpe_ratio": 0.61, "sortino_ratio": 0.9, "standard_dev": 18.2},
                "bench": {"total_return": 80.0, "annualized_return": 7.1, "max_drawdown": -33.9,
                          "sharpe_ratio": 0.5, "sortino_ratio": 0.7, "standard_dev": 15.0},
                "correlation": 0.85, "r_squared": 0.72, "beta": 1.1, "alpha": 2.3
            },
            "results": {
                "columns": ["Period", "Start", "End", "Holdings", "Return", "Bench"],
                "rows": [["1", "2020-01-06", "2020-01-13", 20, 1.5, 0.9]],
                "average": ["", "", "", 20, 1.5, 0.9],
                "upMarkets": ["", "", "", 20, 2.0, 1.0],
                "downMarkets": ["", "", "", 20, -1.0, -2.0]
            },
            "chart": {
                "dates": ["2020-01-06", "2020-01-13"],
                "screenReturns": [0, 1.5],
                "benchReturns": [0, 0.9],
                "turnoverPct": [0, 12.5],
                "positionCnt": [20, 20]
            }
        })
    }

    fn doc() -> Value {
        json!({
            "Main": {"Operation": "ScreenBacktest"},
            "Default Settings": {"Screen": 77, "Start Date": "2020-01-01"}
        })
    }

    #[tokio::test]
    async fn test_three_blocks() {
        let harness = Harness::new(ScriptedClient::new().respond(Request::Backtest, response()));
        let op = harness.run(&doc()).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        let rows: Vec<Vec<String>> = op.get_result().rows().iter().map(|r| text(r)).collect();
        assert_eq!(rows[0], vec!["Stats"]);
        assert_eq!(rows[1][..3], ["", "Tot Return", "Ann Return"]);
        assert_eq!(rows[2], vec!["Screen", "120.50", "9.80", "-35.10", "0.61", "0.90", "18.20", "0.85", "0.72", "1.10", "2.30"]);
        assert_eq!(rows[3].len(), 7);
        assert!(rows[4].is_empty());
        assert_eq!(rows[5], vec!["Results"]);
        assert_eq!(rows[6][0], "Period");
        assert_eq!(rows[8][..2], ["Average", ""]);
        assert_eq!(rows[10][0], "Down Markets");
        assert!(rows[11].is_empty());
        assert_eq!(rows[12], vec!["Time Series"]);
        assert_eq!(rows[13], vec!["Date", "Screen Return %", "Benchmark Return %", "Turnover %", "# Positions"]);
        assert_eq!(rows[15], vec!["2020-01-13", "1.50", "0.90", "12.50", "20"]);
        assert_eq!(rows.len(), 16);

        let sent = &harness.client.calls_of(Request::Backtest)[0];
        assert_eq!(sent["screen"], 77);
        assert_eq!(sent["startDt"], "2020-01-01");
    }

    #[test]
    fn test_results_column_layout() {
        let (columns, _) = results(&response()).unwrap();
        assert_eq!(columns[0], Column::left("Period", 12));
        assert_eq!(columns[3], Column::left("Holdings", 10));
        assert_eq!(columns[4], Column::right("Return"));
    }

    #[test]
    fn test_short_series_is_malformed() {
        let mut json = response();
        json["chart"]["positionCnt"] = json!([20]);
        assert!(matches!(series_rows(&json), Err(OperationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_stats_is_internal_error() {
        let harness = Harness::new(ScriptedClient::new().respond(Request::Backtest, json!({"results": {}})));
        let op = harness.run(&doc()).await;
        assert_eq!(op.status(), RunStatus::Failed);
        assert!(harness.logs.contains("Internal error: Unexpected response: missing \"stats\""));
    }
}
