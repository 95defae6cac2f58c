//! API collaborator.
//!
//! The engine only talks to the remote service through [`ApiClient`]:
//! one `authenticate` call and a `submit` per request kind. Session
//! renewal is the client's job; the engine never re-authenticates.

pub mod http;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::ClientError;

pub use http::{ClientConfig, P123Client};

/// Request kinds understood by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    RollingBacktest,
    Backtest,
    UniverseUpdate,
    RankUpdate,
    Data,
    RankRanks,
    ScreenRun,
    DataUniverse,
}

impl Request {
    /// URL path relative to the API endpoint.
    pub fn path(&self) -> &'static str {
        match self {
            Request::RollingBacktest => "/screen/rolling-backtest",
            Request::Backtest => "/screen/backtest",
            Request::UniverseUpdate => "/universe",
            Request::RankUpdate => "/rank",
            Request::Data => "/data",
            Request::RankRanks => "/rank/ranks",
            Request::ScreenRun => "/screen/run",
            Request::DataUniverse => "/data/universe",
        }
    }

    /// Update requests answer with an empty body.
    pub fn returns_body(&self) -> bool {
        !matches!(self, Request::UniverseUpdate | Request::RankUpdate)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Request::RollingBacktest => "screen rolling backtest",
            Request::Backtest => "screen backtest",
            Request::UniverseUpdate => "universe update",
            Request::RankUpdate => "ranking system update",
            Request::Data => "data",
            Request::RankRanks => "rank ranks",
            Request::ScreenRun => "screen run",
            Request::DataUniverse => "data universe",
        };
        f.write_str(name)
    }
}

/// The contract the engine needs from the remote API.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Obtain a session.
    async fn authenticate(&self) -> Result<(), ClientError>;

    /// Send one request; update requests resolve to `Value::Null`.
    async fn submit(&self, request: Request, payload: &Value) -> Result<Value, ClientError>;
}
