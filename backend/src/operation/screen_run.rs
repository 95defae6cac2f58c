//! Screen run: the securities passing a screen on one date.

use async_trait::async_trait;
use serde_json::Value;

use super::response::array;
use super::{Executor, Outcome, RunContext};
use crate::client::Request;
use crate::error::OperationResult;
use crate::output::{Cell, Column, Row, PREVIEW_ROWS};

pub struct ScreenRun;

#[async_trait]
impl Executor for ScreenRun {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome> {
        ctx.ensure_screen();
        let json = match ctx.submit(Request::ScreenRun, &ctx.defaults).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                return Ok(Outcome::Failed);
            }
        };

        let rows: Vec<Row> = array(&json, "rows")?
            .iter()
            .map(|row| row.as_array().map(|cells| cells.iter().map(Cell::from).collect()).unwrap_or_default())
            .collect();

        let widest = |col: usize| {
            rows.iter()
                .take(PREVIEW_ROWS)
                .filter_map(|r| r.get(col))
                .map(Cell::width)
                .max()
                .unwrap_or(0)
        };
        let mut columns = vec![
            Column::left("P123 UID", 10),
            Column::left("Ticker", widest(1)),
            Column::left("Name", widest(2)),
            Column::right("Last"),
        ];
        if rows.first().is_some_and(|r| r.len() == 5) {
            columns.push(Column::right("Rank"));
        }

        ctx.begin_table(&columns);
        for row in rows {
            ctx.emit(row);
        }
        Ok(Outcome::Success)
    }
}
