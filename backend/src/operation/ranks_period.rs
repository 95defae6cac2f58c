//! Ranks of one ranking system over a sequence of dates, one column per date.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use serde_json::Value;

use super::ranks_multi::RankMatrix;
use super::{Executor, Outcome, RunContext};
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column};
use crate::schema::rules::{parse_date, DATE_FORMAT};
use crate::schema::tables::frequency;

/// Dates from `start` every `days` days, strictly before `end` capped at `today`.
pub fn date_sequence(start: NaiveDate, end: NaiveDate, days: i64, today: NaiveDate) -> Vec<NaiveDate> {
    let end = end.min(today);
    let mut dates = Vec::new();
    let mut date = start;
    while date < end {
        dates.push(date);
        match date.checked_add_signed(Duration::days(days.max(1))) {
            Some(next) => date = next,
            None => break,
        }
    }
    dates
}

pub struct RanksPeriod {
    /// As-of dates; replaced by the date the server actually used
    dates: Vec<Value>,
    next: usize,
    matrix: Option<RankMatrix>,
}

impl RanksPeriod {
    pub fn new(ctx: &mut RunContext) -> Self {
        let settings = &ctx.document.settings;
        let start = settings.value("Start Date").and_then(parse_date);
        let end = settings.value("End Date").and_then(parse_date);
        let days = settings.str("Frequency").and_then(frequency).map(|f| f.days);

        let dates = match (start, end, days) {
            (Some(start), Some(end), Some(days)) => date_sequence(start, end, days, Local::now().date_naive())
                .into_iter()
                .map(|d| Value::from(d.format(DATE_FORMAT).to_string()))
                .collect(),
            _ => Vec::new(),
        };
        let include_names = settings.flag("Include Names");
        Self {
            matrix: Some(RankMatrix::new(dates.len(), include_names)),
            dates,
            next: 0,
        }
    }

    fn log_date(&self, ctx: &RunContext, idx: usize, success: bool) {
        let msg = format!(
            "Iteration {}/{}: {}",
            idx + 1,
            self.dates.len(),
            if success { "success" } else { "failed" }
        );
        if success {
            ctx.logger.info(&msg);
        } else {
            ctx.logger.warning(&msg);
        }
    }

    fn build_table(&mut self, ctx: &mut RunContext) {
        let Some(matrix) = self.matrix.take() else {
            return;
        };
        let mut columns = matrix.identity_columns();
        columns.extend(self.dates.iter().map(|d| Column::right(Cell::from(d).to_string())));

        ctx.begin_table(&columns);
        for row in matrix.into_rows() {
            ctx.emit(row);
        }
    }
}

#[async_trait]
impl Executor for RanksPeriod {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome> {
        let total = self.dates.len();
        let outcome = loop {
            if self.next >= total {
                break Outcome::Success;
            }
            if ctx.control.is_stopped() {
                break Outcome::Stopped;
            }
            if ctx.control.is_paused() {
                return Ok(Outcome::Suspended);
            }

            let idx = self.next;
            let mut params = ctx.defaults.clone();
            params.insert("asOfDt".to_string(), self.dates[idx].clone());

            match ctx.submit(Request::RankRanks, &params).await {
                Ok(json) => {
                    let matrix = self
                        .matrix
                        .as_mut()
                        .ok_or_else(|| OperationError::Internal("rank table already built".into()))?;
                    matrix.absorb(&json, idx)?;
                    if let Some(dt) = json.get("dt").filter(|dt| !dt.is_null()) {
                        self.dates[idx] = dt.clone();
                    }
                    self.log_date(ctx, idx, true);
                }
                Err(e) => {
                    ctx.logger.error(&e.to_string());
                    self.log_date(ctx, idx, false);
                    if !ctx.continue_on_error() {
                        break Outcome::Failed;
                    }
                }
            }
            self.next += 1;
        };

        if self.next > 0 {
            self.build_table(ctx);
        }
        Ok(outcome)
    }
}
