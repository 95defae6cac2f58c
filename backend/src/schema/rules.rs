//! Property validators.
//!
//! Each [`Rule`] checks one raw document value and answers with a
//! three-way [`Verdict`]: valid, invalid, or invalid with a reason that is
//! carried through to the error report.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::tables::Lookup;

/// Date format accepted in documents and sent to the API
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ticker / CUSIP token
static SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.:^_\-]*$").expect("valid symbol pattern"));

/// Outcome of a validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
    Reason(String),
}

impl Verdict {
    fn reason(msg: impl Into<String>) -> Self {
        Verdict::Reason(msg.into())
    }

    fn check(ok: bool) -> Self {
        if ok {
            Verdict::Valid
        } else {
            Verdict::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    /// The specific reason, when one was given.
    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::Reason(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Validator kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Any value
    Any,
    /// Non-empty string
    Text,
    /// Boolean
    Flag,
    /// Integer or float
    Number,
    /// Integer ≥ 1
    PositiveInt,
    /// Integer ≥ 0
    Precision,
    /// `YYYY-MM-DD`
    Date,
    /// A date or a non-empty list of dates
    DateOrDates,
    /// One of the labels, ignoring case
    OneOf(&'static [&'static str]),
    /// A label of a code table
    Lookup(Lookup),
    /// Universe name, ID, or inline definition
    Universe,
    /// Ranking system name, ID, or inline definition
    RankingSystem,
    /// Screen ID or name
    ScreenId,
    /// One rule formula or a list of them
    ScreenRules,
    /// P123 UIDs: integer, space-separated string, or list of integers
    P123Uids,
    /// Tickers or CUSIPs: space-separated string or list of strings
    Symbols,
    /// Non-empty formula
    Formula,
    /// List of formulas, each a string or a single-key `{name: formula}` map
    Formulas,
}

impl Rule {
    pub fn check(&self, value: &Value) -> Verdict {
        match self {
            Rule::Any => Verdict::Valid,
            Rule::Text => Verdict::check(non_empty_str(value).is_some()),
            Rule::Flag => Verdict::check(value.is_boolean()),
            Rule::Number => Verdict::check(value.is_number()),
            Rule::PositiveInt => Verdict::check(value.as_u64().is_some_and(|n| n >= 1)),
            Rule::Precision => Verdict::check(value.as_u64().is_some()),
            Rule::Date => Verdict::check(parse_date(value).is_some()),
            Rule::DateOrDates => check_dates(value),
            Rule::OneOf(labels) => check_one_of(value, labels),
            Rule::Lookup(lookup) => check_lookup(value, lookup),
            Rule::Universe => check_universe(value),
            Rule::RankingSystem => check_ranking_system(value),
            Rule::ScreenId => Verdict::check(value.is_u64() || non_empty_str(value).is_some()),
            Rule::ScreenRules => check_rules(value),
            Rule::P123Uids => check_uids(value),
            Rule::Symbols => check_symbols(value),
            Rule::Formula => Verdict::check(non_empty_str(value).is_some()),
            Rule::Formulas => check_formulas(value),
        }
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a document date.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.as_str()?.trim(), DATE_FORMAT).ok()
}

fn check_dates(value: &Value) -> Verdict {
    match value {
        Value::Array(items) if items.is_empty() => Verdict::reason("at least one date is required"),
        Value::Array(items) => Verdict::check(items.iter().all(|v| parse_date(v).is_some())),
        _ => Verdict::check(parse_date(value).is_some()),
    }
}

fn check_one_of(value: &Value, labels: &[&str]) -> Verdict {
    match value.as_str() {
        Some(s) if labels.iter().any(|l| l.eq_ignore_ascii_case(s.trim())) => Verdict::Valid,
        Some(_) => Verdict::reason(format!("expected one of {}", labels.join(", "))),
        None => Verdict::Invalid,
    }
}

fn check_lookup(value: &Value, lookup: &Lookup) -> Verdict {
    match value.as_str() {
        Some(s) if lookup.find(s).is_some() => Verdict::Valid,
        Some(_) => Verdict::reason(format!("expected one of {}", lookup.labels().join(", "))),
        None => Verdict::Invalid,
    }
}

fn check_rules(value: &Value) -> Verdict {
    match value {
        Value::String(_) => Verdict::check(non_empty_str(value).is_some()),
        Value::Array(items) if items.is_empty() => Verdict::reason("at least one rule is required"),
        Value::Array(items) => {
            if items.iter().all(|v| non_empty_str(v).is_some()) {
                Verdict::Valid
            } else {
                Verdict::reason("every rule must be a non-empty formula")
            }
        }
        _ => Verdict::Invalid,
    }
}

fn check_universe(value: &Value) -> Verdict {
    match value {
        Value::Number(n) => Verdict::check(n.is_u64()),
        Value::String(_) => Verdict::check(non_empty_str(value).is_some()),
        Value::Object(def) => {
            if let Some(key) = def.keys().find(|k| !matches!(k.as_str(), "Rules" | "Starting Universe")) {
                return Verdict::reason(format!("unrecognized universe property \"{}\"", key));
            }
            match def.get("Rules") {
                Some(rules) => check_rules(rules),
                None => Verdict::reason("an inline universe needs \"Rules\""),
            }
        }
        _ => Verdict::Invalid,
    }
}

fn check_ranking_system(value: &Value) -> Verdict {
    match value {
        Value::Number(n) => Verdict::check(n.is_u64()),
        Value::String(_) => Verdict::check(non_empty_str(value).is_some()),
        Value::Object(def) => {
            if let Some(key) = def
                .keys()
                .find(|k| !matches!(k.as_str(), "Formula" | "Nodes" | "Lower is Better"))
            {
                return Verdict::reason(format!("unrecognized ranking system property \"{}\"", key));
            }
            if def.get("Lower is Better").is_some_and(|v| !v.is_boolean()) {
                return Verdict::reason("\"Lower is Better\" must be true or false");
            }
            let formula = def.get("Formula").map(|v| non_empty_str(v).is_some());
            let nodes = def.get("Nodes").map(|v| non_empty_str(v).is_some());
            match (formula, nodes) {
                (Some(true), None) | (None, Some(true)) => Verdict::Valid,
                (Some(_), Some(_)) => Verdict::reason("use either \"Formula\" or \"Nodes\", not both"),
                (None, None) => Verdict::reason("an inline ranking system needs \"Formula\" or \"Nodes\""),
                _ => Verdict::Invalid,
            }
        }
        _ => Verdict::Invalid,
    }
}

fn check_uids(value: &Value) -> Verdict {
    match value {
        Value::Number(n) => Verdict::check(n.is_u64()),
        Value::String(s) => {
            let tokens: Vec<&str> = s.split_whitespace().collect();
            if tokens.is_empty() {
                Verdict::Invalid
            } else if tokens.iter().all(|t| t.parse::<u64>().is_ok()) {
                Verdict::Valid
            } else {
                Verdict::reason("P123 UIDs must be integers")
            }
        }
        Value::Array(items) if items.is_empty() => Verdict::Invalid,
        Value::Array(items) => {
            if items.iter().all(Value::is_u64) {
                Verdict::Valid
            } else {
                Verdict::reason("P123 UIDs must be integers")
            }
        }
        _ => Verdict::Invalid,
    }
}

fn check_symbols(value: &Value) -> Verdict {
    let tokens: Vec<&str> = match value {
        Value::String(s) => s.split_whitespace().collect(),
        Value::Array(items) => match items.iter().map(Value::as_str).collect::<Option<Vec<_>>>() {
            Some(tokens) => tokens,
            None => return Verdict::Invalid,
        },
        _ => return Verdict::Invalid,
    };
    if tokens.is_empty() {
        return Verdict::Invalid;
    }
    match tokens.iter().find(|t| !SYMBOL_RE.is_match(t.trim())) {
        Some(bad) => Verdict::reason(format!("\"{}\" is not a valid identifier", bad)),
        None => Verdict::Valid,
    }
}

fn check_formulas(value: &Value) -> Verdict {
    let Some(items) = value.as_array() else {
        return Verdict::Invalid;
    };
    if items.is_empty() {
        return Verdict::reason("at least one formula is required");
    }
    for item in items {
        let ok = match item {
            Value::String(_) => non_empty_str(item).is_some(),
            Value::Object(named) => named.len() == 1 && named.values().all(|f| non_empty_str(f).is_some()),
            _ => false,
        };
        if !ok {
            return Verdict::reason("each formula must be a string or a single \"name: formula\" pair");
        }
    }
    Verdict::Valid
}

/// Number of identifiers in an identifier-list value.
pub fn item_count(value: &Value) -> usize {
    match value {
        Value::String(s) => s.split_whitespace().count(),
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_date() {
        assert!(Rule::Date.check(&json!("2020-01-01")).is_valid());
        assert_eq!(Rule::Date.check(&json!("2020-13-01")), Verdict::Invalid);
        assert_eq!(Rule::Date.check(&json!(20200101)), Verdict::Invalid);
        assert!(Rule::DateOrDates.check(&json!(["2020-01-01", "2021-01-01"])).is_valid());
        assert!(Rule::DateOrDates.check(&json!([])).message().is_some());
    }

    #[test]
    fn test_one_of_ignores_case_and_explains() {
        let rule = Rule::OneOf(&["stop", "continue"]);
        assert!(rule.check(&json!("Continue")).is_valid());
        assert_eq!(rule.check(&json!("retry")).message(), Some("expected one of stop, continue"));
        assert_eq!(rule.check(&json!(1)), Verdict::Invalid);
    }

    #[test]
    fn test_universe_shapes() {
        assert!(Rule::Universe.check(&json!("SP500")).is_valid());
        assert!(Rule::Universe.check(&json!(123)).is_valid());
        assert!(Rule::Universe.check(&json!({"Rules": ["MktCap > 1000"]})).is_valid());
        assert!(Rule::Universe.check(&json!({"Filter": "x"})).message().is_some());
        assert!(Rule::Universe.check(&json!({})).message().is_some());
        assert_eq!(Rule::Universe.check(&json!(true)), Verdict::Invalid);
    }

    #[test]
    fn test_ranking_system_shapes() {
        assert!(Rule::RankingSystem.check(&json!("Core: Value")).is_valid());
        assert!(Rule::RankingSystem.check(&json!({"Formula": "Pr2SalesQ", "Lower is Better": true})).is_valid());
        assert!(Rule::RankingSystem.check(&json!({"Nodes": "<RankingSystem/>"})).is_valid());
        assert!(Rule::RankingSystem
            .check(&json!({"Formula": "a", "Nodes": "<x/>"}))
            .message()
            .is_some());
        assert!(Rule::RankingSystem
            .check(&json!({"Formula": "a", "Lower is Better": "yes"}))
            .message()
            .is_some());
    }

    #[test]
    fn test_identifier_lists() {
        assert!(Rule::P123Uids.check(&json!(5)).is_valid());
        assert!(Rule::P123Uids.check(&json!("1 2 3")).is_valid());
        assert!(Rule::P123Uids.check(&json!("1 x")).message().is_some());
        assert!(Rule::Symbols.check(&json!("AAPL MSFT BRK.B")).is_valid());
        assert!(Rule::Symbols.check(&json!(["AAPL", "IBM"])).is_valid());
        assert!(Rule::Symbols.check(&json!("AAPL $$$")).message().is_some());
        assert_eq!(Rule::Symbols.check(&json!("")), Verdict::Invalid);
        assert_eq!(item_count(&json!("A B  C")), 3);
        assert_eq!(item_count(&json!(7)), 1);
    }

    #[test]
    fn test_formulas() {
        assert!(Rule::Formulas.check(&json!(["Close(0)", {"Mkt Cap": "MktCap"}])).is_valid());
        assert!(Rule::Formulas.check(&json!([{"a": "x", "b": "y"}])).message().is_some());
        assert!(Rule::Formulas.check(&json!([])).message().is_some());
        assert_eq!(Rule::Formulas.check(&json!("Close(0)")), Verdict::Invalid);
    }
}
