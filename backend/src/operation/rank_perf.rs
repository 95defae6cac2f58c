//! Rank performance: a backtest per rank bucket plus one for the whole
//! universe, summarized as a metric × bucket matrix per iteration.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::iteration::{IterationStrategy, Step};
use super::response::{array, field, number, number_at, round2};
use super::RunContext;
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::logs::LogEntry;
use crate::output::{Cell, Column, Row};
use crate::params::Params;

/// Transaction price forced on every bucket backtest (close)
const TRANS_PRICE_CLOSE: i64 = 4;

pub const METRICS: [&str; 17] = [
    "Annualized return",
    "Average excess return",
    "Total return",
    "% of periods strategy outperforms",
    "Max gain",
    "Max loss",
    "Max gain single stock",
    "Max loss single stock",
    "Avg excess return in Up Markets",
    "Avg excess return in Down Markets",
    "Sharpe",
    "Sortino",
    "StdDev",
    "Max Drawdown",
    "Beta",
    "Alpha",
    "Avg # of positions",
];

/// Results columns of a backtest row
const COL_PORT_RETURN: usize = 8;
const COL_BENCH_RETURN: usize = 9;
const COL_EXCESS: usize = 10;
const COL_LOSS_SINGLE: usize = 15;
const COL_GAIN_SINGLE: usize = 16;

/// Progress through the bucket runs of the current iteration.
struct BucketRuns {
    next: usize,
    rows: Vec<Row>,
}

pub struct RankPerformance {
    buckets: usize,
    header: Vec<Column>,
    runs: Option<BucketRuns>,
}

impl RankPerformance {
    pub fn new(ctx: &mut RunContext) -> Self {
        ctx.ensure_screen();
        let buckets = ctx
            .document
            .settings
            .value("Buckets")
            .and_then(Value::as_u64)
            .unwrap_or(1) as usize;

        let metric_len = METRICS.iter().map(|m| m.chars().count()).max().unwrap_or(0);
        let mut header = vec![Column::left("Metric", metric_len)];
        header.extend((1..=buckets).map(|b| Column::right(format!("Bucket {}", b))));
        header.push(Column::right("Universe"));
        header.push(Column::right("Benchmark"));
        ctx.set_layout(&header);

        Self { buckets, header, runs: None }
    }

    async fn run_bucket(&self, ctx: &RunContext, params: &Params, run: usize, rows: &mut [Row]) -> OperationResult<bool> {
        let json = match ctx.submit(Request::Backtest, params).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                return Ok(false);
            }
        };
        append_metrics(&json, rows, true)?;
        if run == self.buckets {
            append_metrics(&json, rows, false)?;
        }
        Ok(true)
    }

    fn log_run(&self, ctx: &RunContext, idx: usize, run: usize, success: bool) {
        let msg = format!(
            "Iteration {}/{} run {}/{}: {}",
            idx + 1,
            ctx.iteration_count(),
            run + 1,
            self.buckets + 1,
            if success { "success" } else { "failed" }
        );
        let entry = if success { LogEntry::info(msg) } else { LogEntry::warning(msg) };
        ctx.logger.log(entry.with_indent(1));
    }
}

#[async_trait]
impl IterationStrategy for RankPerformance {
    async fn run_iteration(&mut self, ctx: &mut RunContext, idx: usize, mut params: Params) -> OperationResult<Step> {
        let mut runs = self.runs.take().unwrap_or_else(|| BucketRuns {
            next: 0,
            rows: METRICS.iter().map(|m| vec![Cell::text(*m)]).collect(),
        });

        let base_rules: Vec<Value> = params
            .get("screen")
            .and_then(|s| s.get("rules"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        params.insert("transPrice".to_string(), Value::from(TRANS_PRICE_CLOSE));

        // The extra run covers the whole universe
        while runs.next <= self.buckets {
            if ctx.control.should_yield() {
                self.runs = Some(runs);
                return Ok(Step::Paused);
            }

            let mut rules = base_rules.clone();
            if runs.next < self.buckets {
                rules.push(json!({ "formula": bucket_rule(runs.next, self.buckets) }));
            }
            let screen = params
                .get_mut("screen")
                .and_then(Value::as_object_mut)
                .ok_or_else(|| OperationError::Internal("rank performance needs a screen definition".into()))?;
            if rules.is_empty() {
                screen.remove("rules");
            } else {
                screen.insert("rules".to_string(), Value::Array(rules));
            }

            let success = self.run_bucket(ctx, &params, runs.next, &mut runs.rows).await?;
            self.log_run(ctx, idx, runs.next, success);
            if !success {
                if !ctx.continue_on_error() {
                    ctx.log_iteration(idx, false);
                    return Ok(Step::Failed);
                }
                // The universe run also fills the benchmark column
                let gaps = if runs.next == self.buckets { 2 } else { 1 };
                for row in runs.rows.iter_mut() {
                    row.extend(std::iter::repeat(Cell::Na).take(gaps));
                }
            }
            runs.next += 1;
        }
        ctx.log_iteration(idx, true);

        if idx > 0 {
            ctx.emit(Vec::new());
        }
        ctx.emit(vec![Cell::text(ctx.iteration_name(idx))]);
        ctx.begin_table(&self.header);
        for row in runs.rows {
            ctx.emit(row);
        }
        Ok(Step::Done)
    }
}

/// Rule selecting bucket `idx` of `buckets`; the last range includes 100.
pub fn bucket_rule(idx: usize, buckets: usize) -> String {
    let width = 100.0 / buckets as f64;
    let start = round2(width * idx as f64);
    let end = round2(width * (idx + 1) as f64);
    let op = if idx + 1 == buckets { "<=" } else { "<" };
    format!("Rank >= {} and Rank {} {}", start, op, end)
}

/// Append one column of metrics; benchmark mode leaves portfolio-only metrics NA.
pub fn append_metrics(json: &Value, rows: &mut [Row], port_mode: bool) -> OperationResult<()> {
    let stats = field(json, "stats")?;
    let results = field(json, "results")?;
    let result_rows = array(results, "rows")?;
    let side = field(stats, if port_mode { "port" } else { "bench" })?;
    let ret_col = if port_mode { COL_PORT_RETURN } else { COL_BENCH_RETURN };

    let raw = |obj: &Value, key: &str| obj.get(key).and_then(number);
    let stat = |obj: &Value, key: &str| raw(obj, key).map(round2);
    let port_only = |value: Option<f64>| if port_mode { value } else { None };
    let column = |idx: usize| -> OperationResult<Vec<f64>> {
        result_rows.iter().map(|r| number_at(r, idx)).collect()
    };
    let market_excess = |key: &str| -> OperationResult<Option<f64>> {
        Ok(field(results, key)?.get(COL_EXCESS).and_then(number).map(round2))
    };

    let returns = column(ret_col)?;
    let excess = column(COL_EXCESS)?;
    let outperform = if result_rows.is_empty() {
        None
    } else {
        let count = excess.iter().filter(|x| **x > 0.0).count();
        Some(round2(count as f64 / result_rows.len() as f64 * 100.0))
    };
    let port_ann = raw(field(stats, "port")?, "annualized_return");
    let bench_ann = raw(field(stats, "bench")?, "annualized_return");
    let avg_excess = port_ann.zip(bench_ann).map(|(port, bench)| round2(port - bench));

    let values: [Option<f64>; 17] = [
        stat(side, "annualized_return"),
        port_only(avg_excess),
        stat(side, "total_return"),
        port_only(outperform),
        returns.iter().copied().reduce(f64::max).map(round2),
        returns.iter().copied().reduce(f64::min).map(round2),
        port_only(column(COL_GAIN_SINGLE)?.into_iter().reduce(f64::max).map(round2)),
        port_only(column(COL_LOSS_SINGLE)?.into_iter().reduce(f64::min).map(round2)),
        port_only(market_excess("upMarkets")?),
        port_only(market_excess("downMarkets")?),
        stat(side, "sharpe_ratio"),
        stat(side, "sortino_ratio"),
        stat(side, "standard_dev"),
        stat(side, "max_drawdown"),
        port_only(stat(stats, "beta")),
        port_only(stat(stats, "alpha")),
        port_only(array(results, "average")?.get(4).and_then(number).map(round2)),
    ];
    for (row, value) in rows.iter_mut().zip(values) {
        row.push(Cell::float(value));
    }
    Ok(())
}
