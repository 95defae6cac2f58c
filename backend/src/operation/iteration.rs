//! The resumable iteration loop shared by iterating operations.
//!
//! [`IterationDriver`] walks the "Iterations" section: per iteration it
//! generates parameters, merges them over the defaults and hands them to an
//! [`IterationStrategy`]. Its position survives a pause, so the next `run`
//! continues with the iteration that was about to start.

use async_trait::async_trait;
use serde_json::Value;

use super::{Executor, Outcome, RunContext};
use crate::error::{ClientError, OperationResult};
use crate::params::{generate_params, merge_iteration, Params};
use crate::schema::tables::{API_RANKING_SYSTEM, API_UNIVERSE};
use crate::schema::Transform;

/// Result of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done,
    Failed,
    /// Yielded mid-iteration; the same iteration is resumed later
    Paused,
}

/// Per-kind behaviour of an iterating operation.
#[async_trait]
pub trait IterationStrategy: Send {
    /// Run iteration `idx` with its merged parameters.
    async fn run_iteration(&mut self, ctx: &mut RunContext, idx: usize, params: Params) -> OperationResult<Step>;

    /// Called when the loop ends for good; `completed` iterations ran.
    fn finish(&mut self, _ctx: &mut RunContext, _completed: usize) -> OperationResult<()> {
        Ok(())
    }
}

pub struct IterationDriver<S> {
    strategy: S,
    next: usize,
    tracker: ChangeTracker,
}

impl<S: IterationStrategy> IterationDriver<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            next: 0,
            tracker: ChangeTracker::default(),
        }
    }

    async fn iteration_params(&mut self, ctx: &RunContext, idx: usize) -> Option<Params> {
        let section = &ctx.document.iterations[idx];
        let generated = generate_params(section, &ctx.document.settings, ctx.client.as_ref()).await;
        let params = match generated {
            Ok(params) => params,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                return None;
            }
        };
        if let Err(e) = self.tracker.check(ctx, &params).await {
            ctx.logger.error(&e.to_string());
            return None;
        }
        Some(merge_iteration(&ctx.defaults, params))
    }
}

#[async_trait]
impl<S: IterationStrategy> Executor for IterationDriver<S> {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome> {
        let total = ctx.iteration_count();
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
            let step = match self.iteration_params(ctx, idx).await {
                Some(params) => self.strategy.run_iteration(ctx, idx, params).await?,
                None => {
                    ctx.log_iteration(idx, false);
                    Step::Failed
                }
            };
            match step {
                Step::Paused if ctx.control.is_stopped() => break Outcome::Stopped,
                Step::Paused => return Ok(Outcome::Suspended),
                Step::Failed if !ctx.continue_on_error() => break Outcome::Failed,
                Step::Done | Step::Failed => self.next += 1,
            }
        };

        self.strategy.finish(ctx, self.next)?;
        Ok(outcome)
    }
}

// =============================================================================
// API item change tracking
// =============================================================================

/// Inline definitions uploaded under a fixed server-side name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiSlot {
    Universe,
    Ranking,
}

impl ApiSlot {
    const ALL: [ApiSlot; 2] = [ApiSlot::Universe, ApiSlot::Ranking];

    fn key(&self) -> &'static str {
        match self {
            ApiSlot::Universe => "universe",
            ApiSlot::Ranking => "ranking",
        }
    }

    fn api_name(&self) -> &'static str {
        match self {
            ApiSlot::Universe => API_UNIVERSE,
            ApiSlot::Ranking => API_RANKING_SYSTEM,
        }
    }

    fn setting(&self) -> &'static str {
        match self {
            ApiSlot::Universe => "Universe",
            ApiSlot::Ranking => "Ranking",
        }
    }

    fn transform(&self) -> Transform {
        match self {
            ApiSlot::Universe => Transform::Universe,
            ApiSlot::Ranking => Transform::Ranking,
        }
    }
}

/// Keeps the server-side universe / ranking system in sync with the iteration.
///
/// When the default screen uses an uploaded definition and an iteration
/// uploads its own under the same name, the default definition is uploaded
/// again before the next iteration that does not override it.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    changed: [bool; 2],
}

impl ChangeTracker {
    pub async fn check(&mut self, ctx: &RunContext, iteration: &Params) -> Result<(), ClientError> {
        let Some(default_screen) = ctx.defaults.get("screen").and_then(Value::as_object) else {
            return Ok(());
        };
        let iter_screen = iteration.get("screen").and_then(Value::as_object);

        for (slot_idx, slot) in ApiSlot::ALL.into_iter().enumerate() {
            let uses_api = |screen: &serde_json::Map<String, Value>| {
                screen.get(slot.key()).and_then(Value::as_str) == Some(slot.api_name())
            };
            if !uses_api(default_screen) {
                continue;
            }
            if iter_screen.is_some_and(uses_api) {
                self.changed[slot_idx] = true;
            } else if self.changed[slot_idx] {
                if let Some(value) = ctx.document.settings.value(slot.setting()) {
                    slot.transform()
                        .apply(value, &ctx.document.settings, ctx.client.as_ref())
                        .await?;
                }
                self.changed[slot_idx] = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::client::mock::ScriptedClient;
    use crate::client::Request;
    use crate::operation::RunStatus;
    use serde_json::json;

    fn rolling_response(rows: usize) -> Value {
        let row = json!(["2020-01-01", "2020-02-01", 0, 0, 20, 1.0, 0.5, 0.5, -1.0, 2.0, 0.3]);
        json!({
            "rows": vec![row; rows],
            "average": [0, 0, 0, 0, 20.0, 1.0, 0.5, 0.5, 0, 0, 0.3]
        })
    }

    fn doc(iterations: Value, on_error: &str) -> Value {
        json!({
            "Main": {"Operation": "RollingScreen", "On Error": on_error},
            "Default Settings": {"Universe": "SP500", "Start Date": "2015-01-01"},
            "Iterations": iterations
        })
    }

    #[tokio::test]
    async fn test_pause_resumes_at_same_iteration() {
        let client = ScriptedClient::new()
            .respond(Request::RollingBacktest, rolling_response(3))
            .respond(Request::RollingBacktest, rolling_response(3))
            .respond(Request::RollingBacktest, rolling_response(3));
        let harness = Harness::new(client);
        let doc = doc(json!([{"Name": "a"}, {"Name": "b"}, {"Name": "c"}]), "stop");
        let mut op = harness.init(&doc).await.unwrap();

        harness.client.pause_after(1, op.control());
        assert_eq!(op.run().await, RunStatus::Suspended);
        assert!(op.is_paused() && !op.is_finished());
        assert_eq!(op.get_result().len(), 2);

        op.resume();
        assert_eq!(op.run().await, RunStatus::Succeeded);
        assert_eq!(harness.client.calls_of(Request::RollingBacktest).len(), 3);
        let names: Vec<String> = op.get_result().rows()[1..].iter().map(|r| r[0].to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_continue_skips_failed_iteration() {
        let client = ScriptedClient::new()
            .respond(Request::RollingBacktest, rolling_response(3))
            .fail(Request::RollingBacktest, "boom")
            .respond(Request::RollingBacktest, rolling_response(3));
        let harness = Harness::new(client);
        let op = harness.run(&doc(json!([{}, {}, {}]), "continue")).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        assert_eq!(op.get_result().len(), 1 + 2);
        assert!(harness.logs.contains("Iteration 2/3: failed"));
        assert!(harness.logs.contains("Done (RollingScreen)"));
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_at_failed_iteration() {
        let client = ScriptedClient::new()
            .respond(Request::RollingBacktest, rolling_response(3))
            .fail(Request::RollingBacktest, "boom");
        let harness = Harness::new(client);
        let op = harness.run(&doc(json!([{}, {}, {}]), "stop")).await;

        assert_eq!(op.status(), RunStatus::Failed);
        assert_eq!(op.get_result().len(), 1 + 1);
        assert_eq!(harness.client.calls_of(Request::RollingBacktest).len(), 2);
    }

    #[tokio::test]
    async fn test_stop_after_pause_issues_no_more_requests() {
        let client = ScriptedClient::new()
            .respond(Request::RollingBacktest, rolling_response(3))
            .respond(Request::RollingBacktest, rolling_response(3));
        let harness = Harness::new(client);
        let mut op = harness.init(&doc(json!([{}, {}]), "stop")).await.unwrap();
        harness.client.pause_after(1, op.control());

        assert_eq!(op.run().await, RunStatus::Suspended);
        op.stop();
        assert!(op.is_finished());
        assert_eq!(op.run().await, RunStatus::Stopped);
        assert_eq!(harness.client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_iteration() {
        let client = ScriptedClient::new()
            .fail(Request::UniverseUpdate, "bad rules")
            .respond(Request::RollingBacktest, rolling_response(3));
        let harness = Harness::new(client);
        let doc = doc(json!([{"Universe": {"Rules": "x"}}, {}]), "continue");
        let op = harness.run(&doc).await;

        assert_eq!(op.status(), RunStatus::Succeeded);
        assert_eq!(op.get_result().len(), 2);
        assert!(harness.logs.contains("API request failed: bad rules"));
        assert!(harness.logs.contains("Iteration 1/2: failed"));
    }

    #[tokio::test]
    async fn test_default_universe_is_restored_after_override() {
        let responses = (0..4).fold(ScriptedClient::new(), |c, _| {
            c.respond(Request::RollingBacktest, rolling_response(2))
        });
        let harness = Harness::new(responses);
        let doc = json!({
            "Main": {"Operation": "RollingScreen"},
            "Default Settings": {"Universe": {"Rules": ["default"]}, "Start Date": "2015-01-01"},
            "Iterations": [{}, {"Universe": {"Rules": ["override"]}}, {}, {}]
        });
        let op = harness.run(&doc).await;
        assert_eq!(op.status(), RunStatus::Succeeded);

        let uploads: Vec<Value> = harness
            .client
            .calls_of(Request::UniverseUpdate)
            .into_iter()
            .map(|p| p["rules"][0].clone())
            .collect();
        // defaults, iteration 2, restore before iteration 3
        assert_eq!(uploads, vec![json!("default"), json!("override"), json!("default")]);
    }
}
