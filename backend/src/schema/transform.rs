//! Value transforms.
//!
//! A [`Transform`] turns a validated document value into the literal the API
//! expects. Inline universe and ranking system definitions are uploaded
//! first and replaced by their server-side names.

use serde_json::{json, Value};

use super::rules::{parse_date, DATE_FORMAT};
use super::tables::{Lookup, API_RANKING_SYSTEM, API_UNIVERSE};
use crate::client::{ApiClient, Request};
use crate::document::Settings;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// `YYYY-MM-DD` string, normalized
    Date,
    /// Label → API code
    Lookup(Lookup),
    /// UIDs → list of integers
    Uids,
    /// Tickers / CUSIPs → list of strings
    Symbols,
    /// Screen rules → list of `{formula}` objects
    Rules,
    /// Universe name passthrough or inline upload
    Universe,
    /// Ranking system name passthrough or inline upload
    Ranking,
}

impl Transform {
    /// Transform `value`; `Ok(None)` means no usable value could be produced.
    pub async fn apply(
        &self,
        value: &Value,
        settings: &Settings,
        client: &dyn ApiClient,
    ) -> Result<Option<Value>, ClientError> {
        let out = match self {
            Transform::Date => parse_date(value).map(|d| Value::from(d.format(DATE_FORMAT).to_string())),
            Transform::Lookup(lookup) => value.as_str().and_then(|label| lookup.find(label)),
            Transform::Uids => uids(value),
            Transform::Symbols => symbols(value),
            Transform::Rules => rule_list(value).map(|rules| {
                Value::Array(rules.into_iter().map(|formula| json!({ "formula": formula })).collect())
            }),
            Transform::Universe => return universe(value, settings, client).await,
            Transform::Ranking => return ranking(value, settings, client).await,
        };
        Ok(out)
    }
}

fn uids(value: &Value) -> Option<Value> {
    let ids: Option<Vec<u64>> = match value {
        Value::Number(n) => n.as_u64().map(|n| vec![n]),
        Value::String(s) => s.split_whitespace().map(|t| t.parse().ok()).collect(),
        Value::Array(items) => items.iter().map(Value::as_u64).collect(),
        _ => None,
    };
    ids.filter(|ids| !ids.is_empty()).map(|ids| json!(ids))
}

fn symbols(value: &Value) -> Option<Value> {
    let tokens: Option<Vec<String>> = match value {
        Value::String(s) => Some(s.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => None,
    };
    tokens.filter(|t| !t.is_empty()).map(|t| json!(t))
}

fn rule_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.trim().to_string()]),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
        _ => None,
    }
}

async fn universe(
    value: &Value,
    settings: &Settings,
    client: &dyn ApiClient,
) -> Result<Option<Value>, ClientError> {
    let def = match value {
        Value::String(_) | Value::Number(_) => return Ok(Some(value.clone())),
        Value::Object(def) => def,
        _ => return Ok(None),
    };
    let Some(rules) = def.get("Rules").and_then(rule_list) else {
        return Ok(None);
    };

    let mut payload = json!({ "type": settings.asset_type(), "rules": rules });
    if let Some(start) = def.get("Starting Universe") {
        payload["startingUniverse"] = start.clone();
    }
    client.submit(Request::UniverseUpdate, &payload).await?;
    Ok(Some(Value::from(API_UNIVERSE)))
}

async fn ranking(
    value: &Value,
    settings: &Settings,
    client: &dyn ApiClient,
) -> Result<Option<Value>, ClientError> {
    let def = match value {
        Value::String(_) | Value::Number(_) => return Ok(Some(value.clone())),
        Value::Object(def) => def,
        _ => return Ok(None),
    };

    let nodes = if let Some(nodes) = def.get("Nodes").and_then(Value::as_str) {
        nodes.to_string()
    } else if let Some(formula) = def.get("Formula").and_then(Value::as_str) {
        let lower = def.get("Lower is Better").and_then(Value::as_bool).unwrap_or(false);
        formula_nodes(formula, lower)
    } else {
        return Ok(None);
    };

    let payload = json!({ "type": settings.asset_type(), "nodes": nodes });
    client.submit(Request::RankUpdate, &payload).await?;
    Ok(Some(Value::from(API_RANKING_SYSTEM)))
}

/// Single-formula ranking system definition.
fn formula_nodes(formula: &str, lower_is_better: bool) -> String {
    let rank_type = if lower_is_better { "Lower" } else { "Higher" };
    format!(
        "<RankingSystem RankType=\"Higher\"><StockFormula Weight=\"100%\" RankType=\"{}\" \
         Name=\"Formula\" Description=\"\" Scope=\"Universe\"><Formula>{}</Formula>\
         </StockFormula></RankingSystem>",
        rank_type,
        xml_escape(formula.trim())
    )
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::ScriptedClient;

    #[tokio::test]
    async fn test_pure_transforms() {
        let client = ScriptedClient::new();
        let settings = Settings::default();

        let date = Transform::Date.apply(&json!(" 2020-01-05 "), &settings, &client).await.unwrap();
        assert_eq!(date, Some(json!("2020-01-05")));
        let uids = Transform::Uids.apply(&json!("1 22 333"), &settings, &client).await.unwrap();
        assert_eq!(uids, Some(json!([1, 22, 333])));
        let symbols = Transform::Symbols.apply(&json!("AAPL  IBM"), &settings, &client).await.unwrap();
        assert_eq!(symbols, Some(json!(["AAPL", "IBM"])));
        let rules = Transform::Rules.apply(&json!("Close(0) > 5"), &settings, &client).await.unwrap();
        assert_eq!(rules, Some(json!([{ "formula": "Close(0) > 5" }])));
        let code = Transform::Lookup(Lookup::TransPrice)
            .apply(&json!("Close"), &settings, &client)
            .await
            .unwrap();
        assert_eq!(code, Some(json!(4)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_named_universe_passes_through() {
        let client = ScriptedClient::new();
        let out = Transform::Universe
            .apply(&json!("SP500"), &Settings::default(), &client)
            .await
            .unwrap();
        assert_eq!(out, Some(json!("SP500")));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_inline_universe_is_uploaded() {
        let client = ScriptedClient::new();
        let def = json!({ "Rules": ["MktCap > 100"], "Starting Universe": "SP500" });
        let out = Transform::Universe.apply(&def, &Settings::default(), &client).await.unwrap();

        assert_eq!(out, Some(json!(API_UNIVERSE)));
        let sent = client.calls_of(Request::UniverseUpdate);
        assert_eq!(
            sent,
            vec![json!({ "type": "stock", "rules": ["MktCap > 100"], "startingUniverse": "SP500" })]
        );
    }

    #[tokio::test]
    async fn test_inline_ranking_formula_builds_nodes() {
        let client = ScriptedClient::new();
        let def = json!({ "Formula": "Pr2SalesQ < 2", "Lower is Better": true });
        let out = Transform::Ranking.apply(&def, &Settings::default(), &client).await.unwrap();

        assert_eq!(out, Some(json!(API_RANKING_SYSTEM)));
        let sent = client.calls_of(Request::RankUpdate);
        let nodes = sent[0]["nodes"].as_str().unwrap();
        assert!(nodes.contains("RankType=\"Lower\""));
        assert!(nodes.contains("<Formula>Pr2SalesQ &lt; 2</Formula>"));
    }

    #[tokio::test]
    async fn test_upload_failure_propagates() {
        let client = ScriptedClient::new().fail(Request::RankUpdate, "bad nodes");
        let err = Transform::Ranking
            .apply(&json!({ "Nodes": "<x/>" }), &Settings::default(), &client)
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Request("bad nodes".into()));
    }
}
