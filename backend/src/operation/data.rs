//! Data series extraction: one formula per iteration, merged per item into
//! one row per (date, item) once every iteration has run.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use super::iteration::{IterationStrategy, Step};
use super::response::{array, field};
use super::RunContext;
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column, Row, PREVIEW_ROWS};
use crate::params::Params;

/// Longest formula shown as a column name
const MAX_COLUMN_NAME: usize = 50;

/// One security and its series, indexed by iteration.
#[derive(Debug, Clone)]
struct Item {
    uid: String,
    ticker: Value,
    cusip: Value,
    name: Value,
    series: Vec<Option<Vec<Value>>>,
}

pub struct DataSeries {
    dates: Option<Vec<Value>>,
    items: Vec<Item>,
    index: HashMap<String, usize>,
}

impl DataSeries {
    pub fn new(_ctx: &mut RunContext) -> Self {
        Self {
            dates: None,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn merge(&mut self, json: &Value, idx: usize, iterations: usize) -> OperationResult<()> {
        if self.dates.is_none() {
            self.dates = Some(array(json, "dates")?.clone());
        }
        let items = field(json, "items")?
            .as_object()
            .ok_or_else(|| OperationError::Malformed("\"items\" is not an object".into()))?;

        for (uid, data) in items {
            let pos = match self.index.get(uid) {
                Some(pos) => *pos,
                None => {
                    self.items.push(Item {
                        uid: uid.clone(),
                        ticker: data.get("ticker").cloned().unwrap_or(Value::Null),
                        cusip: data.get("cusip").cloned().unwrap_or(Value::Null),
                        name: data.get("name").cloned().unwrap_or(Value::Null),
                        series: vec![None; iterations],
                    });
                    self.index.insert(uid.clone(), self.items.len() - 1);
                    self.items.len() - 1
                }
            };
            let values = array(data, "series")?
                .first()
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            self.items[pos].series[idx] = Some(values);
        }
        Ok(())
    }
}

#[async_trait]
impl IterationStrategy for DataSeries {
    async fn run_iteration(&mut self, ctx: &mut RunContext, idx: usize, mut params: Params) -> OperationResult<Step> {
        let formula = ctx.document.iterations[idx].value("Formula").cloned().unwrap_or(Value::Null);
        params.insert("formulas".to_string(), Value::Array(vec![formula]));

        match ctx.submit(Request::Data, &params).await {
            Ok(json) => {
                self.merge(&json, idx, ctx.iteration_count())?;
                ctx.log_iteration(idx, true);
                Ok(Step::Done)
            }
            Err(e) => {
                ctx.logger.error(&e.to_string());
                ctx.log_iteration(idx, false);
                Ok(Step::Failed)
            }
        }
    }

    fn finish(&mut self, ctx: &mut RunContext, completed: usize) -> OperationResult<()> {
        if completed == 0 {
            return Ok(());
        }
        let include_cusips = ctx.document.settings.contains("Cusips");
        let include_names = ctx.document.settings.flag("Include Names");

        let mut rows: Vec<Row> = Vec::new();
        for (date_idx, date) in self.dates.iter().flatten().enumerate() {
            for item in &self.items {
                let mut row = vec![Cell::from(date), uid_cell(&item.uid), Cell::from(&item.ticker)];
                if include_cusips {
                    row.push(Cell::from(&item.cusip));
                }
                if include_names {
                    row.push(Cell::from(&item.name));
                }
                row.extend(item.series.iter().map(|series| {
                    series
                        .as_ref()
                        .and_then(|values| values.get(date_idx))
                        .map_or(Cell::Na, Cell::from)
                }));
                rows.push(row);
            }
        }

        let widest = |col: usize, min: usize| {
            rows.iter()
                .take(PREVIEW_ROWS)
                .filter_map(|r| r.get(col))
                .map(Cell::width)
                .fold(min, usize::max)
        };
        let mut columns = vec![
            Column::left("Date", 10),
            Column::left("P123 UID", 10),
            Column::left("Ticker", widest(2, 6)),
        ];
        if include_cusips {
            columns.push(Column::left("Cusip", 9));
        }
        if include_names {
            columns.push(Column::left("Company Name", widest(columns.len(), 12)));
        }
        for idx in 0..ctx.iteration_count() {
            let iteration = &ctx.document.iterations[idx];
            let name: String = iteration
                .str("Name")
                .or_else(|| iteration.str("Formula"))
                .unwrap_or_default()
                .chars()
                .take(MAX_COLUMN_NAME)
                .collect();
            let length = name.chars().count().max(12);
            columns.push(Column::right(name).with_length(length));
        }

        ctx.begin_table(&columns);
        for row in rows {
            ctx.emit(row);
        }
        Ok(())
    }
}

/// UIDs are numeric; keep them as numbers when they parse.
fn uid_cell(uid: &str) -> Cell {
    uid.parse::<i64>().map_or_else(|_| Cell::text(uid), Cell::Int)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::client::mock::ScriptedClient;
    use crate::operation::RunStatus;
    use serde_json::json;

    fn response(offset: f64) -> Value {
        json!({
            "dates": ["2020-01-03", "2020-01-10"],
            "items": {
                "5": {"ticker": "AAPL", "name": "Apple Inc", "series": [[1.0 + offset, 2.0 + offset]]},
                "7": {"ticker": "IBM", "name": "IBM Corp", "series": [[3.0 + offset, 4.0 + offset]]}
            }
        })
    }

    fn doc(on_error: &str) -> Value {
        json!({
            "Main": {"Operation": "Data", "On Error": on_error},
            "Default Settings": {"Start Date": "2020-01-01", "Tickers": "AAPL IBM", "Include Names": true},
            "Iterations": [{"Formula": "Close(0)"}, {"Formula": "Volume(0)", "Name": "Vol"}, {"Formula": "PE"}]
        })
    }

    #[tokio::test]
    async fn test_single_iteration_example() {
        let client = ScriptedClient::new().respond(
            Request::Data,
            json!({"dates": ["2020-01-03"], "items": {"5": {"ticker": "AAPL", "series": [[300.5]]}}}),
        );
        let harness = Harness::new(client);
        let doc = json!({
            "Main": {"Operation": "Data"},
            "Default Settings": {"Start Date": "2020-01-01", "Tickers": "AAPL"},
            "Iterations": [{"Formula": "Close(0)"}]
        });
        let op = harness.run(&doc).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        let rows = op.get_result().rows();
        assert_eq!(text(&rows[0]), vec!["Date", "P123 UID", "Ticker", "Close(0)"]);
        assert_eq!(rows[1], vec![Cell::text("2020-01-03"), Cell::Int(5), Cell::text("AAPL"), Cell::Float(300.5)]);
        assert_eq!(rows.len(), 2);

        let sent = &harness.client.calls_of(Request::Data)[0];
        assert_eq!(sent["formulas"], json!(["Close(0)"]));
        assert_eq!(sent["tickers"], json!(["AAPL"]));
        assert_eq!(sent["startDt"], "2020-01-01");
    }

    #[tokio::test]
    async fn test_rows_per_date_and_item() {
        let client = ScriptedClient::new()
            .respond(Request::Data, response(0.0))
            .respond(Request::Data, response(10.0))
            .respond(Request::Data, response(20.0));
        let harness = Harness::new(client);
        let op = harness.run(&doc("stop")).await;

        let rows = op.get_result().rows();
        assert_eq!(
            text(&rows[0]),
            vec!["Date", "P123 UID", "Ticker", "Company Name", "Close(0)", "Vol", "PE"]
        );
        assert_eq!(rows.len(), 1 + 2 * 2);
        assert_eq!(text(&rows[1]), vec!["2020-01-03", "5", "AAPL", "Apple Inc", "1.00", "11.00", "21.00"]);
        assert_eq!(text(&rows[4]), vec!["2020-01-10", "7", "IBM", "IBM Corp", "4.00", "14.00", "24.00"]);
    }

    #[tokio::test]
    async fn test_failed_iteration_renders_na_under_continue() {
        let client = ScriptedClient::new()
            .respond(Request::Data, response(0.0))
            .fail(Request::Data, "bad formula")
            .respond(Request::Data, response(20.0));
        let harness = Harness::new(client);
        let op = harness.run(&doc("continue")).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        let rows = op.get_result().rows();
        assert_eq!(text(&rows[1])[4..], ["1.00", "NA", "21.00"]);
        assert!(harness.logs.contains("Iteration 2/3: failed"));
    }

    #[tokio::test]
    async fn test_stop_on_error_keeps_completed_iterations() {
        let client = ScriptedClient::new()
            .respond(Request::Data, response(0.0))
            .fail(Request::Data, "bad formula");
        let harness = Harness::new(client);
        let op = harness.run(&doc("stop")).await;

        assert_eq!(op.status(), RunStatus::Failed);
        let rows = op.get_result().rows();
        assert_eq!(rows.len(), 5);
        assert_eq!(text(&rows[1])[4..], ["1.00", "NA", "NA"]);
    }

    #[tokio::test]
    async fn test_first_iteration_failure_under_stop_has_no_table() {
        let client = ScriptedClient::new().fail(Request::Data, "bad formula");
        let harness = Harness::new(client);
        let op = harness.run(&doc("stop")).await;
        assert_eq!(op.status(), RunStatus::Failed);
        assert!(op.get_result().is_empty());
    }

    #[tokio::test]
    async fn test_paused_run_builds_no_rows_until_finished() {
        let client = ScriptedClient::new()
            .respond(Request::Data, response(0.0))
            .respond(Request::Data, response(10.0))
            .respond(Request::Data, response(20.0));
        let harness = Harness::new(client);
        let mut op = harness.init(&doc("stop")).await.unwrap();
        harness.client.pause_after(2, op.control());

        assert_eq!(op.run().await, RunStatus::Suspended);
        assert!(op.get_result().is_empty());
        op.resume();
        assert_eq!(op.run().await, RunStatus::Succeeded);
        assert_eq!(op.get_result().len(), 5);
        assert_eq!(harness.client.calls_of(Request::Data).len(), 3);
    }
}
