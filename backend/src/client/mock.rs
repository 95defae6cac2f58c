//! Scripted in-memory client for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{ApiClient, Request};
use crate::error::ClientError;
use crate::operation::RunControl;

/// Answers each request kind from a queue and records every call.
#[derive(Default)]
pub struct ScriptedClient {
    queues: Mutex<HashMap<Request, VecDeque<Result<Value, ClientError>>>>,
    calls: Mutex<Vec<(Request, Value)>>,
    pause_after: Mutex<Option<(usize, RunControl)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, request: Request, response: Value) -> Self {
        self.push(request, Ok(response));
        self
    }

    pub fn fail(self, request: Request, message: &str) -> Self {
        self.push(request, Err(ClientError::Request(message.to_string())));
        self
    }

    fn push(&self, request: Request, response: Result<Value, ClientError>) {
        self.queues
            .lock()
            .unwrap()
            .entry(request)
            .or_default()
            .push_back(response);
    }

    /// Request a pause on `control` once `calls` requests have been answered.
    pub fn pause_after(&self, calls: usize, control: RunControl) {
        *self.pause_after.lock().unwrap() = Some((calls, control));
    }

    pub fn calls(&self) -> Vec<(Request, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, request: Request) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(r, _)| *r == request)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    async fn authenticate(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn submit(&self, request: Request, payload: &Value) -> Result<Value, ClientError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((request, payload.clone()));
            calls.len()
        };
        if let Some((after, control)) = self.pause_after.lock().unwrap().as_ref() {
            if count == *after {
                control.pause();
            }
        }
        self.queues
            .lock()
            .unwrap()
            .get_mut(&request)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| {
                if request.returns_body() {
                    Err(ClientError::Request(format!("no scripted response for {}", request)))
                } else {
                    Ok(Value::Null)
                }
            })
    }
}
