//! Rolling screen backtests: one summary row per iteration.

use async_trait::async_trait;
use serde_json::Value;

use super::iteration::{IterationStrategy, Step};
use super::response::{array, mean, number, number_at, round2};
use super::RunContext;
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column, Row};
use crate::params::Params;

/// Minimum periods for the trailing averages
const TOP_SHORT: usize = 12;
const TOP_LONG: usize = 60;

pub struct RollingScreen;

impl RollingScreen {
    pub fn new(ctx: &mut RunContext) -> Self {
        let name_len = (0..ctx.iteration_count())
            .map(|idx| ctx.iteration_name(idx).chars().count())
            .max()
            .unwrap_or(0);

        let mut columns = vec![
            Column::left("Name", name_len),
            Column::left("Start", 10),
            Column::left("End", 10),
        ];
        columns.extend(
            [
                "Periods",
                "Avg#Pos",
                "AvgRet%",
                "AvgBench%",
                "AvgExcess%",
                "Min%NoSlip",
                "Max%NoSlip",
                "AvgStdDev",
                "Top12AvgRet%",
                "Top60AvgRet%",
            ]
            .into_iter()
            .map(Column::right),
        );
        ctx.begin_table(&columns);
        Self
    }
}

#[async_trait]
impl IterationStrategy for RollingScreen {
    async fn run_iteration(&mut self, ctx: &mut RunContext, idx: usize, params: Params) -> OperationResult<Step> {
        let json = match ctx.submit(Request::RollingBacktest, &params).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                ctx.log_iteration(idx, false);
                return Ok(Step::Failed);
            }
        };

        let mut row = vec![Cell::text(ctx.iteration_name(idx))];
        row.extend(summarize(&json, params.get("startDt"), params.get("endDt"))?);
        ctx.emit(row);
        ctx.log_iteration(idx, true);
        Ok(Step::Done)
    }
}

/// Summary statistics of one rolling backtest.
pub fn summarize(json: &Value, start: Option<&Value>, end: Option<&Value>) -> OperationResult<Row> {
    let rows = array(json, "rows")?;
    let average = array(json, "average")?;
    let avg = |idx: usize| {
        average
            .get(idx)
            .and_then(number)
            .map(round2)
            .ok_or_else(|| OperationError::Malformed(format!("average column {} is not numeric", idx)))
    };
    let column = |idx: usize, take: usize| -> OperationResult<Vec<f64>> {
        rows.iter().take(take).map(|r| number_at(r, idx)).collect()
    };

    let mut out = vec![
        start.map_or(Cell::Na, Cell::from),
        end.map_or(Cell::Na, Cell::from),
        Cell::from(rows.len()),
    ];
    for idx in 4..8 {
        out.push(Cell::Float(avg(idx)?));
    }
    let min_no_slip = column(8, rows.len())?.into_iter().reduce(f64::min);
    let max_no_slip = column(9, rows.len())?.into_iter().reduce(f64::max);
    out.push(Cell::float(min_no_slip.map(round2)));
    out.push(Cell::float(max_no_slip.map(round2)));
    out.push(Cell::Float(avg(10)?));

    for top in [TOP_SHORT, TOP_LONG] {
        let trailing = if rows.len() >= top {
            mean(&column(5, top)?).map(round2)
        } else {
            None
        };
        out.push(Cell::float(trailing));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::client::mock::ScriptedClient;
    use crate::operation::RunStatus;
    use serde_json::json;

    /// `count` rows whose return column (5) is 1, 2, 3, ...
    fn response(count: usize) -> Value {
        let rows: Vec<Value> = (0..count)
            .map(|i| json!(["d", "d", 0, 0, 10, (i + 1).to_string(), 0, 0, -(i as f64), i as f64, 0]))
            .collect();
        json!({"rows": rows, "average": [0, 0, 0, 0, 21.456, 1.111, 0.5, 0.611, 0, 0, 3.14159]})
    }

    #[test]
    fn test_short_history_has_no_trailing_averages() {
        let row = summarize(&response(11), Some(&json!("2020-01-01")), None).unwrap();
        assert_eq!(
            text(&row),
            vec!["2020-01-01", "NA", "11", "21.46", "1.11", "0.50", "0.61", "-10.00", "10.00", "3.14", "NA", "NA"]
        );
    }

    #[test]
    fn test_trailing_averages_use_leading_rows() {
        let row = summarize(&response(60), None, None).unwrap();
        // mean(1..=12) = 6.5, mean(1..=60) = 30.5
        assert_eq!(row[10], Cell::Float(6.5));
        assert_eq!(row[11], Cell::Float(30.5));

        let row = summarize(&response(20), None, None).unwrap();
        assert_eq!(row[10], Cell::Float(6.5));
        assert_eq!(row[11], Cell::Na);
    }

    #[test]
    fn test_non_numeric_column_is_malformed() {
        let json = json!({"rows": [["a", "b", 0, 0, 1, 1, 1, 1, "x", 1, 1]], "average": [0, 0, 0, 0, 1, 1, 1, 1, 0, 0, 1]});
        assert!(matches!(summarize(&json, None, None), Err(OperationError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_rows_and_header() {
        let client = ScriptedClient::new()
            .respond(Request::RollingBacktest, response(12))
            .respond(Request::RollingBacktest, response(3));
        let harness = Harness::new(client);
        let doc = json!({
            "Main": {"Operation": "RollingScreen"},
            "Default Settings": {"Screen": 1234, "Start Date": "2010-01-01", "End Date": "2020-01-01"},
            "Iterations": [{"Name": "Long name here"}, {"Start Date": "2015-01-01"}]
        });
        let op = harness.run(&doc).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        let rows = op.get_result().rows();
        assert_eq!(rows[0][0], Cell::text("Name"));
        assert_eq!(rows[0].len(), 13);
        assert_eq!(text(&rows[1])[..3], ["Long name here", "2010-01-01", "2020-01-01"]);
        assert_eq!(text(&rows[2])[..3], ["Iteration 2", "2015-01-01", "2020-01-01"]);

        let sent = harness.client.calls_of(Request::RollingBacktest);
        assert_eq!(sent[0]["screen"], 1234);
        assert!(harness.sink.lines()[1].starts_with("Long name here  2010-01-01"));
        assert!(harness.logs.contains("Iteration 2/2: success"));
    }
}
