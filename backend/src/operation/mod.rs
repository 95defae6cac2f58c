//! Operation state machines.
//!
//! An [`Operation`] owns a validated document, the default request
//! parameters generated from it and one executor per operation kind.
//! `run()` drives the executor until it finishes or yields to a pause;
//! calling it again resumes at the exact position it stopped.
//!
//! Execution is cooperative: pause and stop are flags on a [`RunControl`]
//! checked at iteration (and sub-run) boundaries, never mid-request.

pub mod data;
pub mod data_universe;
pub mod iteration;
pub mod rank_perf;
pub mod ranks;
pub mod ranks_multi;
pub mod ranks_period;
mod response;
pub mod rolling_screen;
pub mod screen_backtest;
pub mod screen_run;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::{ApiClient, Request};
use crate::document::{process_input, Document};
use crate::error::{ClientResult, OperationError, OperationResult};
use crate::logs::Logger;
use crate::output::{Cell, Column, OutputSink, Preview, ResultTable, Row};
use crate::params::{generate_params, Params};
use crate::schema::OperationKind;

pub use iteration::{ChangeTracker, IterationDriver, IterationStrategy, Step};

// =============================================================================
// Run control
// =============================================================================

/// Shared pause / stop flags.
///
/// Clones share state, so a handle can be given to another task (a signal
/// handler, a UI) while the operation runs.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Prevent any further request from being issued.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// True when the current loop should give control back.
    pub fn should_yield(&self) -> bool {
        self.is_paused() || self.is_stopped()
    }
}

/// Where a run stands after a `run()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    /// Paused; `run()` resumes
    Suspended,
    Succeeded,
    /// Failed under `On Error: stop`, or an internal fault
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed | RunStatus::Stopped)
    }
}

/// What an executor reports back from one `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
    /// Yielded to a pause; state is kept for the next call
    Suspended,
    /// Yielded to a stop; partial results are final
    Stopped,
}

// =============================================================================
// Run context
// =============================================================================

/// State shared by every executor: the document, default parameters,
/// collaborators and the growing result.
pub struct RunContext {
    pub document: Document,
    /// Parameters generated from "Default Settings"; single-shot executors
    /// add their request-specific keys here
    pub defaults: Params,
    pub client: Arc<dyn ApiClient>,
    pub logger: Arc<dyn Logger>,
    pub control: RunControl,
    result: ResultTable,
    preview: Preview,
}

impl RunContext {
    pub fn new(
        document: Document,
        defaults: Params,
        client: Arc<dyn ApiClient>,
        sink: Box<dyn OutputSink>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            document,
            defaults,
            client,
            logger,
            control: RunControl::new(),
            result: ResultTable::new(),
            preview: Preview::new(sink),
        }
    }

    pub fn continue_on_error(&self) -> bool {
        self.document.continue_on_error
    }

    pub fn iteration_count(&self) -> usize {
        self.document.iterations.len()
    }

    /// `Name` of an iteration, or `Iteration N`.
    pub fn iteration_name(&self, idx: usize) -> String {
        self.document
            .iterations
            .get(idx)
            .and_then(|it| it.str("Name"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Iteration {}", idx + 1))
    }

    pub async fn submit(&self, request: Request, params: &Params) -> ClientResult<Value> {
        self.client.submit(request, &Value::Object(params.clone())).await
    }

    /// Add a `screen` object to the defaults when none was generated.
    pub fn ensure_screen(&mut self) {
        if !self.defaults.contains_key("screen") {
            let kind = self.document.settings.str("Type").unwrap_or_default().to_string();
            self.defaults.insert("screen".to_string(), json!({ "type": kind }));
        }
    }

    /// Lay out the rows that follow by `columns`.
    pub fn set_layout(&mut self, columns: &[Column]) {
        self.preview.set_layout(columns);
    }

    /// Start a block of rows laid out by `columns`, emitting the header row.
    pub fn begin_table(&mut self, columns: &[Column]) {
        let header: Row = columns.iter().map(|c| Cell::text(c.name.as_str())).collect();
        self.preview.set_layout(columns);
        self.preview.header(&header);
        self.result.push(header);
    }

    /// Append a data row.
    pub fn emit(&mut self, row: Row) {
        self.preview.row(&row);
        self.result.push(row);
    }

    /// Append a single-cell title row.
    pub fn emit_title(&mut self, title: &str) {
        self.preview.value(title);
        self.result.push(vec![Cell::text(title)]);
    }

    pub fn log_iteration(&self, idx: usize, success: bool) {
        let msg = format!(
            "Iteration {}/{}: {}",
            idx + 1,
            self.iteration_count(),
            if success { "success" } else { "failed" }
        );
        if success {
            self.logger.info(&msg);
        } else {
            self.logger.warning(&msg);
        }
    }

    pub fn result(&self) -> &ResultTable {
        &self.result
    }
}

/// One operation kind's run logic.
#[async_trait]
pub trait Executor: Send {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome>;
}

fn build_executor(ctx: &mut RunContext) -> Box<dyn Executor> {
    match ctx.document.kind {
        OperationKind::RollingScreen => {
            Box::new(IterationDriver::new(rolling_screen::RollingScreen::new(ctx)))
        }
        OperationKind::RankPerformance => {
            Box::new(IterationDriver::new(rank_perf::RankPerformance::new(ctx)))
        }
        OperationKind::Data => Box::new(IterationDriver::new(data::DataSeries::new(ctx))),
        OperationKind::RanksMulti => Box::new(IterationDriver::new(ranks_multi::RanksMulti::new(ctx))),
        OperationKind::ScreenRun => Box::new(screen_run::ScreenRun),
        OperationKind::ScreenBacktest => Box::new(screen_backtest::ScreenBacktest),
        OperationKind::DataUniverse => Box::new(data_universe::DataUniverse),
        OperationKind::Ranks => Box::new(ranks::Ranks),
        OperationKind::RanksPeriod => Box::new(ranks_period::RanksPeriod::new(ctx)),
    }
}

// =============================================================================
// Operation
// =============================================================================

/// A runnable operation.
pub struct Operation {
    ctx: RunContext,
    executor: Box<dyn Executor>,
    status: RunStatus,
}

impl Operation {
    /// Validate `raw` and build the operation; `None` when the document is
    /// invalid or default parameters cannot be generated (the reason is logged).
    pub async fn init(
        client: Arc<dyn ApiClient>,
        raw: &Value,
        sink: Box<dyn OutputSink>,
        logger: Arc<dyn Logger>,
    ) -> Option<Self> {
        Self::try_init(client, raw, sink, logger).await.ok()
    }

    pub async fn try_init(
        client: Arc<dyn ApiClient>,
        raw: &Value,
        sink: Box<dyn OutputSink>,
        logger: Arc<dyn Logger>,
    ) -> OperationResult<Self> {
        let document = process_input(raw, logger.as_ref())?;
        Self::from_document(client, document, sink, logger).await
    }

    /// Build from an already validated document.
    pub async fn from_document(
        client: Arc<dyn ApiClient>,
        document: Document,
        sink: Box<dyn OutputSink>,
        logger: Arc<dyn Logger>,
    ) -> OperationResult<Self> {
        logger.info(&format!("Running ({})", document.kind));

        let mut defaults = generate_params(&document.settings, &document.settings, client.as_ref())
            .await
            .map_err(|e| {
                logger.error(&e.to_string());
                e
            })?;
        if let Some(precision) = document.precision {
            defaults.insert("precision".to_string(), Value::from(precision));
        }

        let mut ctx = RunContext::new(document, defaults, client, sink, logger);
        let executor = build_executor(&mut ctx);
        Ok(Self {
            ctx,
            executor,
            status: RunStatus::Pending,
        })
    }

    /// Run until done or paused.
    pub async fn run(&mut self) -> RunStatus {
        if self.is_finished() {
            if self.ctx.control.is_stopped() && !self.status.is_terminal() {
                self.status = RunStatus::Stopped;
                self.ctx.preview.finish();
            }
            return self.status;
        }

        let outcome = match self.executor.run(&mut self.ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let msg = match &e {
                    OperationError::Internal(_) => e.to_string(),
                    other => format!("Internal error: {}", other),
                };
                self.ctx.logger.error(&msg);
                Outcome::Failed
            }
        };

        self.status = match outcome {
            Outcome::Success => {
                self.ctx.logger.info(&format!("Done ({})", self.ctx.document.kind));
                RunStatus::Succeeded
            }
            Outcome::Failed => RunStatus::Failed,
            Outcome::Stopped => RunStatus::Stopped,
            Outcome::Suspended if self.ctx.control.is_stopped() => RunStatus::Stopped,
            Outcome::Suspended => RunStatus::Suspended,
        };
        if self.status.is_terminal() {
            self.ctx.preview.finish();
        }
        self.status
    }

    pub fn pause(&self) {
        self.ctx.control.pause();
    }

    pub fn resume(&self) {
        self.ctx.control.resume();
    }

    pub fn stop(&self) {
        self.ctx.control.stop();
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.control.is_paused()
    }

    /// Finished, or stopped.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() || self.ctx.control.is_stopped()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn kind(&self) -> OperationKind {
        self.ctx.document.kind
    }

    /// A handle to pause or stop the run from elsewhere.
    pub fn control(&self) -> RunControl {
        self.ctx.control.clone()
    }

    pub fn default_params(&self) -> &Params {
        &self.ctx.defaults
    }

    pub fn get_result(&self) -> &ResultTable {
        self.ctx.result()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::client::mock::ScriptedClient;
    use crate::logs::LogCapture;
    use crate::output::BufferSink;

    /// Operation wired to a scripted client, an in-memory log and sink.
    pub struct Harness {
        pub client: Arc<ScriptedClient>,
        pub logs: Arc<LogCapture>,
        pub sink: BufferSink,
    }

    impl Harness {
        pub fn new(client: ScriptedClient) -> Self {
            Self {
                client: Arc::new(client),
                logs: Arc::new(LogCapture::new()),
                sink: BufferSink::new(),
            }
        }

        pub async fn init(&self, doc: &Value) -> Option<Operation> {
            Operation::init(
                self.client.clone(),
                doc,
                Box::new(self.sink.clone()),
                self.logs.clone(),
            )
            .await
        }

        pub async fn run(&self, doc: &Value) -> Operation {
            let mut op = self.init(doc).await.expect("operation builds");
            op.run().await;
            op
        }
    }

    pub fn text(row: &[Cell]) -> Vec<String> {
        row.iter().map(|c| c.to_string()).collect()
    }
}
